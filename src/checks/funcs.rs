//! Host functions exposed to check scripts
//!
//! Functions take and return JSON values so they stay independent of the
//! script engine. Every function checks its argument count and types and
//! reports a [`FuncError`] instead of faulting.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde_json::{Value, json};

use super::error::ChecksError;
use super::network::PrivateNetworks;

/// Error returned by a host function to the calling script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuncError(String);

impl FuncError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

impl fmt::Display for FuncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for FuncError {}

pub type HostFunction = Arc<dyn Fn(&[Value]) -> Result<Value, FuncError> + Send + Sync>;

/// Function set keyed by name, iterated in a stable order
pub type FuncSet = BTreeMap<&'static str, HostFunction>;

/// Hands out the host functions each check version may call
#[derive(Debug, Clone)]
pub struct FuncRegistry {
    networks: Arc<PrivateNetworks>,
}

impl FuncRegistry {
    pub fn new(networks: Arc<PrivateNetworks>) -> Self {
        Self { networks }
    }

    pub fn funcs_for_version(&self, version: u32) -> Result<FuncSet, ChecksError> {
        match version {
            1 => {
                let networks = Arc::clone(&self.networks);
                let mut funcs: FuncSet = BTreeMap::new();
                funcs.insert("parse_version", Arc::new(parse_version));
                funcs.insert("format_version", Arc::new(format_version));
                funcs.insert("format_version_num", Arc::new(format_version_num));
                funcs.insert(
                    "ip_is_private",
                    Arc::new(move |args: &[Value]| ip_is_private(&networks, args)),
                );
                Ok(funcs)
            }
            v => Err(ChecksError::UnsupportedVersion(v)),
        }
    }
}

fn expect_args(args: &[Value], n: usize) -> Result<(), FuncError> {
    if args.len() != n {
        return Err(FuncError::new(format!(
            "expected {n} argument{}, got {}",
            if n == 1 { "" } else { "s" },
            args.len()
        )));
    }
    Ok(())
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

fn string_arg(value: &Value) -> Result<&str, FuncError> {
    value.as_str().ok_or_else(|| {
        FuncError::new(format!(
            "expected string argument, got {} ({value})",
            type_name(value)
        ))
    })
}

fn int_arg(value: &Value) -> Result<i64, FuncError> {
    value.as_i64().ok_or_else(|| {
        FuncError::new(format!(
            "expected int argument, got {} ({value})",
            type_name(value)
        ))
    })
}

static VERSION_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^v?(\d+)\.(\d+)\.(\d+)(.*)$").ok());

/// A dotted version split into its parts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    pub major: i64,
    pub minor: i64,
    pub patch: i64,
    pub rest: String,
}

impl Version {
    pub fn parse(s: &str) -> Result<Self, FuncError> {
        let failed = || FuncError::new(format!("failed to parse {s:?}"));
        let re = VERSION_RE.as_ref().ok_or_else(failed)?;
        let caps = re.captures(s.trim()).ok_or_else(failed)?;
        let part = |i: usize| -> Result<i64, FuncError> {
            caps[i].parse::<i64>().map_err(|_| failed())
        };

        Ok(Self {
            major: part(1)?,
            minor: part(2)?,
            patch: part(3)?,
            rest: caps[4].to_string(),
        })
    }

    /// Packed `MMmmpp` form, `8.0.19` is `80019`
    pub fn num(&self) -> i64 {
        self.major * 10000 + self.minor * 100 + self.patch
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}{}", self.major, self.minor, self.patch, self.rest)
    }
}

/// `parse_version(s) -> {major, minor, patch, rest, num}`
pub fn parse_version(args: &[Value]) -> Result<Value, FuncError> {
    expect_args(args, 1)?;
    let version = Version::parse(string_arg(&args[0])?)?;

    Ok(json!({
        "major": version.major,
        "minor": version.minor,
        "patch": version.patch,
        "rest": version.rest,
        "num": version.num(),
    }))
}

/// `format_version(dict) -> string`, inverse of `parse_version`
pub fn format_version(args: &[Value]) -> Result<Value, FuncError> {
    expect_args(args, 1)?;
    let dict = args[0].as_object().ok_or_else(|| {
        FuncError::new(format!(
            "expected dict argument, got {} ({})",
            type_name(&args[0]),
            args[0]
        ))
    })?;

    let field = |name: &str| {
        dict.get(name)
            .ok_or_else(|| FuncError::new(format!("missing key {name:?}")))
    };
    let version = Version {
        major: int_arg(field("major")?)?,
        minor: int_arg(field("minor")?)?,
        patch: int_arg(field("patch")?)?,
        rest: match dict.get("rest") {
            Some(rest) => string_arg(rest)?.to_string(),
            None => String::new(),
        },
    };

    Ok(Value::String(version.to_string()))
}

/// `format_version_num(80019) -> "8.0.19"`
pub fn format_version_num(args: &[Value]) -> Result<Value, FuncError> {
    expect_args(args, 1)?;
    let num = int_arg(&args[0])?;
    if num < 0 {
        return Err(FuncError::new(format!("version number {num} is negative")));
    }

    Ok(Value::String(format!(
        "{}.{}.{}",
        num / 10000,
        num / 100 % 100,
        num % 100
    )))
}

/// `ip_is_private(s) -> bool` for an address or CIDR network
pub fn ip_is_private(networks: &PrivateNetworks, args: &[Value]) -> Result<Value, FuncError> {
    expect_args(args, 1)?;
    let input = string_arg(&args[0])?;

    networks
        .is_private(input)
        .map(Value::Bool)
        .map_err(|e| FuncError::new(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    fn registry() -> FuncRegistry {
        FuncRegistry::new(Arc::new(PrivateNetworks::new()))
    }

    #[test]
    fn test_parse_version() {
        let parsed = parse_version(&[json!("8.0.19-10")]).unwrap();
        assert_eq!(
            parsed,
            json!({"major": 8, "minor": 0, "patch": 19, "rest": "-10", "num": 80019})
        );

        let parsed = parse_version(&[json!("v5.7.30")]).unwrap();
        assert_eq!(parsed["num"], 50730);
        assert_eq!(parsed["rest"], "");
    }

    #[test]
    fn test_parse_version_errors() {
        assert_eq!(
            parse_version(&[json!(1)]).unwrap_err().to_string(),
            "expected string argument, got int (1)"
        );
        assert_eq!(
            parse_version(&[json!("foo")]).unwrap_err().to_string(),
            "failed to parse \"foo\""
        );
        assert_eq!(
            parse_version(&[]).unwrap_err().to_string(),
            "expected 1 argument, got 0"
        );
    }

    #[test]
    fn test_format_version_num() {
        assert_eq!(format_version_num(&[json!(80019)]).unwrap(), json!("8.0.19"));
        assert_eq!(format_version_num(&[json!(100203)]).unwrap(), json!("10.2.3"));
        assert_eq!(format_version_num(&[json!(0)]).unwrap(), json!("0.0.0"));
        assert!(format_version_num(&[json!(-1)]).is_err());
        assert!(format_version_num(&[json!("80019")]).is_err());
    }

    #[test]
    fn test_format_version() {
        let parsed = parse_version(&[json!("8.0.19-10")]).unwrap();
        assert_eq!(format_version(&[parsed]).unwrap(), json!("8.0.19-10"));

        assert_matches!(format_version(&[json!({"major": 1})]), Err(_));
        assert_matches!(format_version(&[json!([1, 2, 3])]), Err(_));
    }

    #[test]
    fn test_ip_is_private() {
        let networks = PrivateNetworks::new();
        assert_eq!(ip_is_private(&networks, &[json!("10.1.2.3")]).unwrap(), json!(true));
        assert_eq!(ip_is_private(&networks, &[json!("8.8.8.8")]).unwrap(), json!(false));
        assert!(ip_is_private(&networks, &[json!("not an ip")]).is_err());
        assert!(ip_is_private(&networks, &[json!(10)]).is_err());
    }

    #[test]
    fn test_funcs_for_version() {
        let funcs = registry().funcs_for_version(1).unwrap();
        assert_eq!(
            funcs.keys().copied().collect::<Vec<_>>(),
            vec![
                "format_version",
                "format_version_num",
                "ip_is_private",
                "parse_version"
            ]
        );

        let private = &funcs["ip_is_private"];
        assert_eq!(private(&[json!("192.168.0.1")]).unwrap(), json!(true));
    }

    #[test]
    fn test_unsupported_version() {
        assert!(matches!(
            registry().funcs_for_version(99),
            Err(ChecksError::UnsupportedVersion(99))
        ));
        assert!(registry().funcs_for_version(0).is_err());
    }
}
