//! Expressions and projected fields

use std::collections::BTreeMap;
use std::fmt;

use super::functions;

/// Data types known to the query layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DataType {
    #[default]
    Unknown,
    Float,
    Integer,
    Unsigned,
    String,
    Boolean,
    /// Tag (dimension) column
    Tag,
}

impl DataType {
    /// Map a catalog field type code to a query data type
    ///
    /// Codes follow the storage record layout: 1 integer, 2 unsigned,
    /// 3 float, 4 string, 5 boolean, 6 tag.
    pub fn from_field_code(code: i32) -> Self {
        match code {
            1 => DataType::Integer,
            2 => DataType::Unsigned,
            3 => DataType::Float,
            4 => DataType::String,
            5 => DataType::Boolean,
            6 => DataType::Tag,
            _ => DataType::Unknown,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            DataType::Float | DataType::Integer | DataType::Unsigned
        )
    }
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    // Comparison
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    RegexMatch,
    RegexNotMatch,
    // Logical
    And,
    Or,
}

impl BinaryOp {
    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod
        )
    }

    fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Eq => "=",
            BinaryOp::NotEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::RegexMatch => "=~",
            BinaryOp::RegexNotMatch => "!~",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
        }
    }
}

/// Query expression
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Expr {
    /// Reference to a field, tag or upstream column
    VarRef { name: String, data_type: DataType },
    /// Function call
    Call { name: String, args: Vec<Expr> },
    /// Binary operation
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// Parenthesized expression
    Paren(Box<Expr>),
    Integer(i64),
    String(String),
    Boolean(bool),
    /// Duration in nanoseconds
    Duration(i64),
    Wildcard,
}

impl Expr {
    pub fn var(name: impl Into<String>, data_type: DataType) -> Self {
        Expr::VarRef {
            name: name.into(),
            data_type,
        }
    }

    pub fn call(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Call {
            name: name.into(),
            args,
        }
    }

    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    /// Visit this expression and all sub-expressions in pre-order
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a Expr)) {
        f(self);
        match self {
            Expr::Call { args, .. } => {
                for arg in args {
                    arg.walk(f);
                }
            }
            Expr::Binary { lhs, rhs, .. } => {
                lhs.walk(f);
                rhs.walk(f);
            }
            Expr::Paren(inner) => inner.walk(f),
            _ => {}
        }
    }

    /// Names of every call in this expression, outermost first
    pub fn call_names(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.walk(&mut |e| {
            if let Expr::Call { name, .. } = e {
                names.push(name.as_str());
            }
        });
        names
    }

    /// Whether this expression is a call to an aggregate function
    pub fn is_aggregate_call(&self) -> bool {
        matches!(self, Expr::Call { name, .. } if functions::is_aggregate(name))
    }

    /// Tags pinned to a single value by equality predicates
    ///
    /// Only conjunctions pin tags; a disjunction anywhere yields no pins
    /// for that branch because either side may hold.
    pub fn tag_equalities(&self) -> BTreeMap<String, String> {
        let mut pins = BTreeMap::new();
        self.collect_equalities(&mut pins);
        pins
    }

    fn collect_equalities(&self, pins: &mut BTreeMap<String, String>) {
        match self {
            Expr::Paren(inner) => inner.collect_equalities(pins),
            Expr::Binary {
                op: BinaryOp::And,
                lhs,
                rhs,
            } => {
                lhs.collect_equalities(pins);
                rhs.collect_equalities(pins);
            }
            Expr::Binary {
                op: BinaryOp::Eq,
                lhs,
                rhs,
            } => match (lhs.as_ref(), rhs.as_ref()) {
                (Expr::VarRef { name, .. }, Expr::String(value))
                | (Expr::String(value), Expr::VarRef { name, .. }) => {
                    pins.entry(name.clone()).or_insert_with(|| value.clone());
                }
                _ => {}
            },
            _ => {}
        }
    }

    /// Replace every var ref for which `f` returns a substitute
    pub fn rewrite_var_refs(&self, f: &impl Fn(&str) -> Option<Expr>) -> Expr {
        match self {
            Expr::VarRef { name, .. } => f(name).unwrap_or_else(|| self.clone()),
            Expr::Call { name, args } => Expr::Call {
                name: name.clone(),
                args: args.iter().map(|a| a.rewrite_var_refs(f)).collect(),
            },
            Expr::Binary { op, lhs, rhs } => Expr::Binary {
                op: *op,
                lhs: Box::new(lhs.rewrite_var_refs(f)),
                rhs: Box::new(rhs.rewrite_var_refs(f)),
            },
            Expr::Paren(inner) => Expr::Paren(Box::new(inner.rewrite_var_refs(f))),
            other => other.clone(),
        }
    }

    /// Output name of this expression when used as a field
    fn field_name(&self) -> String {
        match self {
            Expr::Call { name, .. } => name.clone(),
            Expr::VarRef { name, .. } => name.clone(),
            Expr::Paren(inner) => inner.field_name(),
            Expr::Binary { lhs, rhs, .. } => {
                let l = lhs.field_name();
                let r = rhs.field_name();
                match (l.is_empty(), r.is_empty()) {
                    (false, false) => format!("{}_{}", l, r),
                    (false, true) => l,
                    _ => r,
                }
            }
            _ => String::new(),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::VarRef { name, .. } => write!(f, "{}", name),
            Expr::Call { name, args } => {
                write!(f, "{}(", name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            Expr::Binary { op, lhs, rhs } => write!(f, "{} {} {}", lhs, op.symbol(), rhs),
            Expr::Paren(inner) => write!(f, "({})", inner),
            Expr::Integer(v) => write!(f, "{}", v),
            Expr::String(v) => write!(f, "'{}'", v),
            Expr::Boolean(v) => write!(f, "{}", v),
            Expr::Duration(v) => write!(f, "{}ns", v),
            Expr::Wildcard => write!(f, "*"),
        }
    }
}

/// Projected field of a query
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Field {
    pub expr: Expr,
    pub alias: Option<String>,
}

impl Field {
    pub fn new(expr: Expr) -> Self {
        Self { expr, alias: None }
    }

    pub fn with_alias(expr: Expr, alias: impl Into<String>) -> Self {
        Self {
            expr,
            alias: Some(alias.into()),
        }
    }

    /// Alias if present, otherwise the name derived from the expression
    pub fn name(&self) -> String {
        match &self.alias {
            Some(alias) if !alias.is_empty() => alias.clone(),
            _ => self.expr.field_name(),
        }
    }

    pub fn alias(&self) -> &str {
        self.alias.as_deref().unwrap_or("")
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.alias {
            Some(alias) if !alias.is_empty() => write!(f, "{} AS {}", self.expr, alias),
            _ => write!(f, "{}", self.expr),
        }
    }
}
