use serde::{Deserialize, Serialize};

use waymark_core::types::NodeId;

/// Doubles closer than this to an integer are treated as that integer.
pub const INTEGER_EPSILON: f64 = 1e-6;

/// Declared type of a parameter slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
    Double,
    Boolean,
}

/// A resolved parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Str(String),
    Int(i64),
    Double(f64),
    Bool(bool),
}

impl Value {
    /// Integer view. Doubles within [`INTEGER_EPSILON`] of an integer round to
    /// it; other doubles truncate toward zero.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Double(d) => double_to_int(*d),
            Value::Bool(b) => Some(i64::from(*b)),
            Value::Str(s) => {
                let s = s.trim();
                s.parse::<i64>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().and_then(double_to_int))
            }
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Double(d) => Some(*d),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Str(s) => s.trim().parse::<f64>().ok(),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Int(i) => Some(*i != 0),
            Value::Double(d) => Some(d.abs() >= INTEGER_EPSILON),
            Value::Str(s) => parse_bool(s),
        }
    }

    /// Display text. Near-integral doubles print without a fractional part.
    pub fn to_text(&self) -> String {
        match self {
            Value::Str(s) => s.clone(),
            Value::Int(i) => i.to_string(),
            Value::Double(d) => format_double(*d),
            Value::Bool(b) => b.to_string(),
        }
    }
}

fn double_to_int(d: f64) -> Option<i64> {
    if !d.is_finite() {
        return None;
    }
    let rounded = d.round();
    if (d - rounded).abs() < INTEGER_EPSILON {
        Some(rounded as i64)
    } else {
        Some(d.trunc() as i64)
    }
}

/// Format a double for display: integral text within the epsilon contract,
/// otherwise up to six decimals with trailing zeros trimmed.
pub fn format_double(d: f64) -> String {
    if !d.is_finite() {
        return d.to_string();
    }
    let rounded = d.round();
    if (d - rounded).abs() < INTEGER_EPSILON {
        // Adding 0.0 folds -0 into 0.
        return format!("{:.0}", rounded + 0.0);
    }
    let text = format!("{:.6}", d);
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// Lenient boolean parsing used for user-entered text.
pub fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// A named, typed value slot on a command node.
///
/// The raw text is always kept. Typed forms are refreshed only when the raw
/// text parses, so a bad edit leaves the last valid typed value in place.
/// While `attached` is set, the provider node is authoritative and the raw
/// value is only the fallback.
#[derive(Debug, Clone)]
pub struct Parameter {
    name: String,
    ty: ParamType,
    raw: String,
    int_value: i64,
    double_value: f64,
    bool_value: bool,
    attached: Option<NodeId>,
}

impl Parameter {
    pub fn new(name: impl Into<String>, ty: ParamType, raw: impl Into<String>) -> Self {
        let mut param = Self {
            name: name.into(),
            ty,
            raw: String::new(),
            int_value: 0,
            double_value: 0.0,
            bool_value: false,
            attached: None,
        };
        param.set_value(raw);
        param
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> ParamType {
        self.ty
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn attached(&self) -> Option<&NodeId> {
        self.attached.as_ref()
    }

    pub fn is_attached(&self) -> bool {
        self.attached.is_some()
    }

    /// Store new raw text. Returns whether it parsed as the declared type.
    pub fn set_value(&mut self, raw: impl Into<String>) -> bool {
        self.raw = raw.into();
        match self.ty {
            ParamType::String => true,
            ParamType::Integer => match Value::Str(self.raw.clone()).as_int() {
                Some(i) => {
                    self.int_value = i;
                    self.double_value = i as f64;
                    true
                }
                None => false,
            },
            ParamType::Double => match self.raw.trim().parse::<f64>() {
                Ok(d) => {
                    self.double_value = d;
                    self.int_value = double_to_int(d).unwrap_or(self.int_value);
                    true
                }
                Err(_) => false,
            },
            ParamType::Boolean => match parse_bool(&self.raw) {
                Some(b) => {
                    self.bool_value = b;
                    true
                }
                None => false,
            },
        }
    }

    /// The locally stored value in its declared type.
    pub fn literal(&self) -> Value {
        match self.ty {
            ParamType::String => Value::Str(self.raw.clone()),
            ParamType::Integer => Value::Int(self.int_value),
            ParamType::Double => Value::Double(self.double_value),
            ParamType::Boolean => Value::Bool(self.bool_value),
        }
    }

    pub(crate) fn attach(&mut self, provider: NodeId) {
        self.attached = Some(provider);
    }

    pub(crate) fn detach(&mut self) -> Option<NodeId> {
        self.attached.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_failure_keeps_last_valid() {
        let mut p = Parameter::new("quantity", ParamType::Integer, "12");
        assert_eq!(p.literal(), Value::Int(12));

        assert!(!p.set_value("twelve"));
        assert_eq!(p.raw(), "twelve");
        assert_eq!(p.literal(), Value::Int(12));

        assert!(p.set_value("30"));
        assert_eq!(p.literal(), Value::Int(30));
    }

    #[test]
    fn test_integer_accepts_near_integral_double_text() {
        let p = Parameter::new("y", ParamType::Integer, "63.9999995");
        assert_eq!(p.literal(), Value::Int(64));
    }

    #[test]
    fn test_boolean_lenient_parse() {
        let mut p = Parameter::new("value", ParamType::Boolean, "yes");
        assert_eq!(p.literal(), Value::Bool(true));
        p.set_value("OFF");
        assert_eq!(p.literal(), Value::Bool(false));
        assert!(!p.set_value("maybe"));
        assert_eq!(p.literal(), Value::Bool(false));
    }

    #[test]
    fn test_double_rounding_contract() {
        assert_eq!(Value::Double(63.9999995).as_int(), Some(64));
        assert_eq!(Value::Double(-2.0000004).as_int(), Some(-2));
        assert_eq!(Value::Double(63.7).as_int(), Some(63));
        assert_eq!(Value::Double(-3.5).as_int(), Some(-3));
        assert_eq!(Value::Double(f64::NAN).as_int(), None);
    }

    #[test]
    fn test_double_display() {
        assert_eq!(Value::Double(63.9999995).to_text(), "64");
        assert_eq!(Value::Double(12.5).to_text(), "12.5");
        assert_eq!(Value::Double(0.1 + 0.2).to_text(), "0.3");
        assert_eq!(Value::Double(-0.25).to_text(), "-0.25");
    }

    #[test]
    fn test_double_display_beyond_int_range() {
        assert_eq!(format_double(1e19), "10000000000000000000");
        assert_eq!(format_double(-1e19), "-10000000000000000000");
        assert_eq!(format_double(-0.0000000001), "0");
    }

    #[test]
    fn test_cross_type_views() {
        assert_eq!(Value::Str(" 42 ".into()).as_int(), Some(42));
        assert_eq!(Value::Str("abc".into()).as_int(), None);
        assert_eq!(Value::Int(0).as_bool(), Some(false));
        assert_eq!(Value::Bool(true).as_double(), Some(1.0));
    }

    #[test]
    fn test_detach_returns_provider() {
        let mut p = Parameter::new("x", ParamType::Integer, "5");
        p.attach(NodeId::from_str("coords"));
        assert!(p.is_attached());
        assert_eq!(p.detach(), Some(NodeId::from_str("coords")));
        assert_eq!(p.literal(), Value::Int(5));
    }
}
