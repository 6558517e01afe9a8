//! macros callable from variables: `$(path::name arg=value ...)`
//!
//! The macro receives the evaluated value of the referenced node (`None` when the reference is empty or resolved to
//! nothing) and its arguments parsed as Laconic attributes.
use crate::node::{Attribute, ConfigNode, Section};
use crate::value::FromValue;
use crate::{Error, Result};
use chrono::{Local, NaiveDateTime, Utc};
use std::fmt::{Display, Write};

pub trait MacroRunner: Send + Sync {
    fn run(&self, name: &str, input: Option<&str>, args: Section<'_>) -> Result<String>;
}

/// `now`, `as-string`, `as-int`, `as-long`, `as-double`, `as-decimal`, `as-bool`, `as-datetime`, `as-guid`
///
/// Conversions fall back to the `dflt` argument (or the type's zero value) when the input does not convert.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinMacros;

impl MacroRunner for BuiltinMacros {
    fn run(&self, name: &str, input: Option<&str>, args: Section<'_>) -> Result<String> {
        let input = input.filter(|value| !value.is_empty());
        let dflt = args.attr("dflt");

        let output = match name.to_ascii_lowercase().as_str() {
            "now" => {
                let format = args.attr("fmt").value()?;
                match (args.flag("utc"), format.is_empty()) {
                    (true, true) => Utc::now().to_rfc3339(),
                    (true, false) => render(name, Utc::now().format(&format))?,
                    (false, true) => Local::now().to_rfc3339(),
                    (false, false) => render(name, Local::now().format(&format))?,
                }
            }
            "as-string" => match input {
                Some(value) => value.to_string(),
                None => dflt.value()?,
            },
            "as-int" => convert::<i32>(input, dflt, 0)?.to_string(),
            "as-long" => convert::<i64>(input, dflt, 0)?.to_string(),
            "as-double" | "as-decimal" => convert::<f64>(input, dflt, 0.0)?.to_string(),
            "as-bool" => convert::<bool>(input, dflt, false)?.to_string(),
            "as-datetime" => {
                let parsed = match input.and_then(NaiveDateTime::from_value) {
                    Some(date_time) => Some(date_time),
                    None => NaiveDateTime::from_value(&dflt.value()?),
                };
                let format = match args.attr("fmt").value()? {
                    format if format.is_empty() => "%Y-%m-%d %H:%M:%S".to_string(),
                    format => format,
                };
                match parsed {
                    Some(date_time) => render(name, date_time.format(&format))?,
                    None => String::new(),
                }
            }
            "as-guid" => match input.and_then(uuid::Uuid::from_value) {
                Some(guid) => guid.hyphenated().to_string(),
                None => dflt.value()?,
            },
            _ => {
                return Err(Error::Macro {
                    name: name.to_string(),
                    message: "unknown macro".to_string(),
                })
            }
        };

        tracing::trace!(name, ?input, %output, "macro");
        Ok(output)
    }
}

/// chrono reports bad format strings through `fmt::Error` instead of panicking when written with `write!`
fn render(name: &str, formatted: impl Display) -> Result<String> {
    let mut out = String::new();
    write!(out, "{formatted}").map_err(|_| Error::Macro {
        name: name.to_string(),
        message: "invalid date/time format".to_string(),
    })?;
    Ok(out)
}

fn convert<T: FromValue>(input: Option<&str>, dflt: Attribute<'_>, zero: T) -> Result<T> {
    if let Some(converted) = input.and_then(T::from_value) {
        return Ok(converted);
    }
    dflt.value_as_or(zero)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::laconic;
    use pretty_assertions::assert_eq;

    fn run(name: &str, input: Option<&str>, args: &str) -> Result<String> {
        let args = laconic!(&format!("args{{ {args} }}"));
        BuiltinMacros.run(name, input, args.root())
    }

    #[test]
    fn conversions_with_defaults() {
        assert_eq!(run("as-int", Some("0x10"), "").unwrap(), "16");
        assert_eq!(run("as-int", Some("abc"), "dflt=-5").unwrap(), "-5");
        assert_eq!(run("as-int", None, "").unwrap(), "0");
        let long = run("AS-LONG", Some("123456789012"), "").unwrap();
        assert_eq!(long, "123456789012");
        assert_eq!(run("as-double", Some("2.5"), "").unwrap(), "2.5");
        assert_eq!(run("as-bool", Some("yes"), "").unwrap(), "true");
        assert_eq!(run("as-bool", Some("maybe"), "dflt=true").unwrap(), "true");
        assert_eq!(run("as-string", None, "dflt=fallback").unwrap(), "fallback");
        let given = run("as-string", Some("given"), "dflt=fallback").unwrap();
        assert_eq!(given, "given");
    }

    #[test]
    fn date_times_and_guids() {
        let input = Some("2024-03-01T10:30:00Z");
        let date = run("as-datetime", input, r#"fmt="%d.%m.%Y""#);
        assert_eq!(date.unwrap(), "01.03.2024");
        assert_eq!(run("as-datetime", Some("nope"), "").unwrap(), "");
        let braced = Some("{67E55044-10B1-426F-9247-BB680E5FE0C8}");
        let guid = run("as-guid", braced, "");
        assert_eq!(guid.unwrap(), "67e55044-10b1-426f-9247-bb680e5fe0c8");
    }

    #[test]
    fn now_formats() {
        let year = run("now", None, r#"fmt="%Y" utc=true"#).unwrap();
        assert_eq!(year, Utc::now().format("%Y").to_string());
        assert!(run("now", None, "").unwrap().contains('T'));
    }

    #[test]
    fn bad_format_is_an_error() {
        assert!(run("now", None, r#"fmt="%Q%""#).is_err());
    }

    #[test]
    fn unknown_macro() {
        assert!(matches!(
            run("frobnicate", None, ""),
            Err(Error::Macro { name, .. }) if name == "frobnicate"
        ));
    }
}
