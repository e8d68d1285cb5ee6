//! Native functions installed in the global frame.

use std::time::{SystemTime, UNIX_EPOCH};

use super::scope::Env;
use super::value::{Builtin, Value};

/// Bind every builtin in `globals`.
pub fn install(globals: &Env) {
    let mut frame = globals.borrow_mut();
    for builtin in Builtin::ALL {
        // A fresh global frame has no bindings, so define cannot collide.
        let _ = frame.define(builtin.name(), Value::Builtin(builtin), false);
    }
}

/// Invoke a builtin. Errors are plain messages; the caller attaches position.
pub fn call(builtin: Builtin, args: &[Value]) -> Result<Value, String> {
    match builtin {
        Builtin::Clock => {
            let secs = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs_f64())
                .unwrap_or(0.0);
            Ok(Value::Number(secs))
        }
        Builtin::ToString => match args {
            [value] => Ok(Value::Str(value.to_string())),
            _ => Err("toString expects 1 argument".to_string()),
        },
        Builtin::ToNumber => match args {
            [value] => value
                .to_number()
                .map(Value::Number)
                .ok_or_else(|| "Cannot convert to number".to_string()),
            _ => Err("toNumber expects 1 argument".to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_string_requires_one_argument() {
        assert_eq!(
            call(Builtin::ToString, &[]).unwrap_err(),
            "toString expects 1 argument"
        );
        assert!(matches!(
            call(Builtin::ToString, &[Value::Number(2.5)]),
            Ok(Value::Str(s)) if s == "2.5"
        ));
    }

    #[test]
    fn to_number_rejects_text() {
        assert_eq!(
            call(Builtin::ToNumber, &[Value::Str("twelve".into())]).unwrap_err(),
            "Cannot convert to number"
        );
        assert!(matches!(
            call(Builtin::ToNumber, &[Value::Str(" 12 ".into())]),
            Ok(Value::Number(n)) if n == 12.0
        ));
    }

    #[test]
    fn clock_is_positive_seconds() {
        let Ok(Value::Number(now)) = call(Builtin::Clock, &[]) else {
            panic!("clock should return a number");
        };
        assert!(now > 1_600_000_000.0);
    }
}
