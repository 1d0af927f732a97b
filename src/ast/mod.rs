use serde::{Deserialize, Serialize};

pub mod hash;
pub mod print;
pub mod source_map;
pub use source_map::SourceMap;

// ---- Span infrastructure ----

/// Byte range within source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn merge(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

impl From<std::ops::Range<usize>> for Span {
    fn from(r: std::ops::Range<usize>) -> Self {
        Span { start: r.start, end: r.end }
    }
}

// ---- Expressions ----

/// Expression tree. Every child is owned by its parent; serializes as a
/// record tagged by `"kind"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expr {
    Int { value: i64 },
    Float {
        #[serde(with = "float_literal")]
        value: f64,
    },
    String { value: String },
    Bool { value: bool },
    Null,

    /// Variable reference, optionally qualified by a component scope.
    Var {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        scope: Option<String>,
    },

    /// Static property read on a named variable: `object.field`
    Property { object: String, field: String },

    /// `object.property` on an arbitrary expression
    Member { object: Box<Expr>, property: PropertyName },

    /// `object[key]`
    Computed { object: Box<Expr>, key: Box<Expr> },

    /// `array[index]` with a numeric index
    Index { array: Box<Expr>, index: Box<Expr> },

    Binary { op: BinOp, left: Box<Expr>, right: Box<Expr> },

    Unary { op: UnaryOp, operand: Box<Expr> },

    Ternary {
        condition: Box<Expr>,
        then: Box<Expr>,
        #[serde(rename = "else")]
        otherwise: Box<Expr>,
    },

    /// Call of a builtin or host function by name
    Call { function: String, args: Vec<Expr> },

    MethodCall { receiver: Box<Expr>, method: String, args: Vec<Expr> },

    Group { inner: Box<Expr> },

    Array { elements: Vec<Expr> },

    /// Parallel key and value lists; a later duplicate key wins.
    Object { keys: Vec<String>, values: Vec<Expr> },

    /// Stored and serialized, never executed.
    Arrow { params: Vec<String>, body: Box<Expr>, expression_body: bool },
}

/// Static property name with its hash computed once at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyName {
    name: String,
    hash: u64,
}

impl PropertyName {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let hash = hash::fnv1a(&name);
        PropertyName { name, hash }
    }

    pub fn as_str(&self) -> &str {
        &self.name
    }

    pub fn hash(&self) -> u64 {
        self.hash
    }
}

impl Serialize for PropertyName {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.name)
    }
}

impl<'de> Deserialize<'de> for PropertyName {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(PropertyName::new)
    }
}

/// JSON has no non-finite numbers, so NaN and the infinities travel as the
/// strings `"NaN"`, `"inf"` and `"-inf"`. Finite values stay plain numbers.
mod float_literal {
    use serde::de::{self, Deserializer, Unexpected};
    use serde::{Deserialize, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_f64(*value)
        } else if value.is_nan() {
            serializer.serialize_str("NaN")
        } else if value.is_sign_positive() {
            serializer.serialize_str("inf")
        } else {
            serializer.serialize_str("-inf")
        }
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(f64),
        Text(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        match Repr::deserialize(deserializer)? {
            Repr::Number(n) => Ok(n),
            Repr::Text(text) => match text.as_str() {
                "NaN" => Ok(f64::NAN),
                "inf" => Ok(f64::INFINITY),
                "-inf" => Ok(f64::NEG_INFINITY),
                _ => Err(de::Error::invalid_value(Unexpected::Str(&text), &"a number, \"NaN\", \"inf\" or \"-inf\"")),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    And,
    Or,
    Concat,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Eq => "==",
            BinOp::Neq => "!=",
            BinOp::Lt => "<",
            BinOp::Lte => "<=",
            BinOp::Gt => ">",
            BinOp::Gte => ">=",
            BinOp::And => "&&",
            BinOp::Or => "||",
            BinOp::Concat => "++",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOp {
    Neg,
    Not,
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Not => "!",
        }
    }
}

impl Expr {
    pub fn int(value: i64) -> Self {
        Expr::Int { value }
    }

    pub fn float(value: f64) -> Self {
        Expr::Float { value }
    }

    pub fn string(value: impl Into<String>) -> Self {
        Expr::String { value: value.into() }
    }

    pub fn bool(value: bool) -> Self {
        Expr::Bool { value }
    }

    pub fn null() -> Self {
        Expr::Null
    }

    /// `"Counter:value"` splits into scope `Counter` and name `value`.
    pub fn var(name: &str) -> Self {
        match name.split_once(':') {
            Some((scope, name)) if !scope.is_empty() && !name.is_empty() => Expr::scoped_var(scope, name),
            _ => Expr::Var { name: name.to_string(), scope: None },
        }
    }

    pub fn scoped_var(scope: impl Into<String>, name: impl Into<String>) -> Self {
        Expr::Var { name: name.into(), scope: Some(scope.into()) }
    }

    pub fn property(object: impl Into<String>, field: impl Into<String>) -> Self {
        Expr::Property { object: object.into(), field: field.into() }
    }

    pub fn member(object: Expr, property: impl Into<String>) -> Self {
        Expr::Member { object: Box::new(object), property: PropertyName::new(property) }
    }

    pub fn computed(object: Expr, key: Expr) -> Self {
        Expr::Computed { object: Box::new(object), key: Box::new(key) }
    }

    pub fn index(array: Expr, index: Expr) -> Self {
        Expr::Index { array: Box::new(array), index: Box::new(index) }
    }

    pub fn binary(op: BinOp, left: Expr, right: Expr) -> Self {
        Expr::Binary { op, left: Box::new(left), right: Box::new(right) }
    }

    pub fn unary(op: UnaryOp, operand: Expr) -> Self {
        Expr::Unary { op, operand: Box::new(operand) }
    }

    pub fn ternary(condition: Expr, then: Expr, otherwise: Expr) -> Self {
        Expr::Ternary {
            condition: Box::new(condition),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        }
    }

    pub fn call(function: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Call { function: function.into(), args }
    }

    pub fn method_call(receiver: Expr, method: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::MethodCall { receiver: Box::new(receiver), method: method.into(), args }
    }

    pub fn group(inner: Expr) -> Self {
        Expr::Group { inner: Box::new(inner) }
    }

    pub fn array(elements: Vec<Expr>) -> Self {
        Expr::Array { elements }
    }

    pub fn object(entries: Vec<(String, Expr)>) -> Self {
        let (keys, values) = entries.into_iter().unzip();
        Expr::Object { keys, values }
    }

    pub fn arrow(params: Vec<String>, body: Expr, expression_body: bool) -> Self {
        Expr::Arrow { params, body: Box::new(body), expression_body }
    }

    /// Snake-case kind tag, identical to the serialized `"kind"` field.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Expr::Int { .. } => "int",
            Expr::Float { .. } => "float",
            Expr::String { .. } => "string",
            Expr::Bool { .. } => "bool",
            Expr::Null => "null",
            Expr::Var { .. } => "var",
            Expr::Property { .. } => "property",
            Expr::Member { .. } => "member",
            Expr::Computed { .. } => "computed",
            Expr::Index { .. } => "index",
            Expr::Binary { .. } => "binary",
            Expr::Unary { .. } => "unary",
            Expr::Ternary { .. } => "ternary",
            Expr::Call { .. } => "call",
            Expr::MethodCall { .. } => "method_call",
            Expr::Group { .. } => "group",
            Expr::Array { .. } => "array",
            Expr::Object { .. } => "object",
            Expr::Arrow { .. } => "arrow",
        }
    }

    pub fn is_literal(&self) -> bool {
        matches!(
            self,
            Expr::Int { .. } | Expr::Float { .. } | Expr::String { .. } | Expr::Bool { .. } | Expr::Null
        )
    }
}

// ---- Statements ----

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl AssignOp {
    pub fn bin_op(self) -> BinOp {
        match self {
            AssignOp::Add => BinOp::Add,
            AssignOp::Sub => BinOp::Sub,
            AssignOp::Mul => BinOp::Mul,
            AssignOp::Div => BinOp::Div,
        }
    }
}

/// Statements, tagged by `"op"` in the interchange format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Stmt {
    /// `target = value`
    Assign {
        target: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        scope: Option<String>,
        value: Expr,
    },

    /// `target += value` and friends
    CompoundAssign {
        target: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        scope: Option<String>,
        operator: AssignOp,
        value: Expr,
    },

    If {
        condition: Expr,
        #[serde(default)]
        then: Vec<Stmt>,
        #[serde(default, rename = "else")]
        otherwise: Vec<Stmt>,
    },

    While {
        condition: Expr,
        #[serde(default)]
        body: Vec<Stmt>,
    },

    /// `for (item in iterable) { body }`
    ForEach {
        item: String,
        iterable: Expr,
        #[serde(default)]
        body: Vec<Stmt>,
    },

    /// Function call evaluated for its effects
    Call { function: String, args: Vec<Expr> },

    Return {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<Expr>,
    },

    Break,
    Continue,

    Delete { target: Expr },
}

impl Stmt {
    pub fn assign(target: &str, value: Expr) -> Self {
        match target.split_once(':') {
            Some((scope, name)) if !scope.is_empty() && !name.is_empty() => Stmt::Assign {
                target: name.to_string(),
                scope: Some(scope.to_string()),
                value,
            },
            _ => Stmt::Assign { target: target.to_string(), scope: None, value },
        }
    }

    pub fn compound_assign(target: impl Into<String>, operator: AssignOp, value: Expr) -> Self {
        Stmt::CompoundAssign { target: target.into(), scope: None, operator, value }
    }

    pub fn if_else(condition: Expr, then: Vec<Stmt>, otherwise: Vec<Stmt>) -> Self {
        Stmt::If { condition, then, otherwise }
    }

    pub fn while_loop(condition: Expr, body: Vec<Stmt>) -> Self {
        Stmt::While { condition, body }
    }

    pub fn for_each(item: impl Into<String>, iterable: Expr, body: Vec<Stmt>) -> Self {
        Stmt::ForEach { item: item.into(), iterable, body }
    }

    pub fn call(function: impl Into<String>, args: Vec<Expr>) -> Self {
        Stmt::Call { function: function.into(), args }
    }

    pub fn ret(value: Option<Expr>) -> Self {
        Stmt::Return { value }
    }

    pub fn delete(target: Expr) -> Self {
        Stmt::Delete { target }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Stmt::Assign { .. } => "assign",
            Stmt::CompoundAssign { .. } => "compound_assign",
            Stmt::If { .. } => "if",
            Stmt::While { .. } => "while",
            Stmt::ForEach { .. } => "for_each",
            Stmt::Call { .. } => "call",
            Stmt::Return { .. } => "return",
            Stmt::Break => "break",
            Stmt::Continue => "continue",
            Stmt::Delete { .. } => "delete",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn span_merge_takes_extremes() {
        let a = Span { start: 5, end: 10 };
        let b = Span { start: 2, end: 15 };
        assert_eq!(a.merge(b), Span { start: 2, end: 15 });
    }

    #[test]
    fn scoped_var_splits_on_colon() {
        assert_eq!(Expr::var("Counter:value"), Expr::scoped_var("Counter", "value"));
        assert_eq!(Expr::var("plain"), Expr::Var { name: "plain".into(), scope: None });
        // A bare trailing colon is not a scope separator
        assert_eq!(Expr::var("odd:"), Expr::Var { name: "odd:".into(), scope: None });
    }

    #[test]
    fn json_shape_is_kind_tagged() {
        let e = Expr::binary(BinOp::Add, Expr::var("x"), Expr::int(1));
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "kind": "binary",
                "op": "add",
                "left": {"kind": "var", "name": "x"},
                "right": {"kind": "int", "value": 1}
            })
        );
    }

    #[test]
    fn ternary_uses_else_key() {
        let e = Expr::ternary(Expr::bool(true), Expr::int(1), Expr::null());
        let json = serde_json::to_string(&e).unwrap();
        assert!(json.contains("\"else\""));
        let back: Expr = serde_json::from_str(&json).unwrap();
        assert_eq!(back, e);
    }

    #[test]
    fn property_name_hash_survives_deserialization() {
        let e = Expr::member(Expr::var("user"), "name");
        let back: Expr = serde_json::from_str(&serde_json::to_string(&e).unwrap()).unwrap();
        let Expr::Member { property, .. } = back else { panic!("expected member") };
        assert_eq!(property.as_str(), "name");
        assert_eq!(property.hash(), hash::fnv1a("name"));
    }

    #[test]
    fn statements_round_trip() {
        let stmts = vec![
            Stmt::assign("Counter:value", Expr::int(0)),
            Stmt::for_each("x", Expr::var("xs"), vec![Stmt::compound_assign("total", AssignOp::Add, Expr::var("x"))]),
            Stmt::if_else(Expr::var("done"), vec![Stmt::Break], vec![]),
            Stmt::ret(None),
        ];
        let json = serde_json::to_string(&stmts).unwrap();
        let back: Vec<Stmt> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, stmts);
    }

    #[test]
    fn object_constructor_keeps_parallel_lists() {
        let e = Expr::object(vec![("a".into(), Expr::int(1)), ("b".into(), Expr::int(2))]);
        let Expr::Object { keys, values } = e else { panic!("expected object") };
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(values.len(), 2);
    }
}
