use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;
use rand::distr::Alphanumeric;

use crate::scope::ScopeView;

const MAX_RANDOM_STRING: usize = 64 * 1024;

/// Generator functions callable from templates. Every call produces a fresh
/// value; nothing is memoized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::EnumString, strum::Display)]
pub enum Builtin {
    #[strum(serialize = "uuid")]
    Uuid,
    #[strum(serialize = "timestamp")]
    Timestamp,
    #[strum(serialize = "randomInt")]
    RandomInt,
    #[strum(serialize = "randomString")]
    RandomString,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CallError {
    #[error("unknown function `{0}`")]
    Unknown(String),

    #[error("`{name}` takes {expected} argument(s), got {got}")]
    Arity {
        name: Builtin,
        expected: usize,
        got: usize,
    },

    #[error("`{name}` argument `{arg}` is not an integer")]
    NotInteger { name: Builtin, arg: String },

    #[error("`randomInt` range is empty: {min} > {max}")]
    EmptyRange { min: i64, max: i64 },

    #[error("`randomString` length {0} is out of range")]
    Length(i64),
}

/// Evaluate `name(args)`. Arguments are integer literals or names of scope
/// variables holding integers.
pub(crate) fn call(name: &str, args: &[&str], scope: &ScopeView<'_>) -> Result<String, CallError> {
    let builtin: Builtin = name
        .parse()
        .map_err(|_| CallError::Unknown(name.to_string()))?;

    let arity = match builtin {
        Builtin::Uuid | Builtin::Timestamp => 0,
        Builtin::RandomInt => 2,
        Builtin::RandomString => 1,
    };
    if args.len() != arity {
        return Err(CallError::Arity {
            name: builtin,
            expected: arity,
            got: args.len(),
        });
    }

    match builtin {
        Builtin::Uuid => Ok(uuid::Uuid::new_v4().to_string()),
        Builtin::Timestamp => {
            let ms = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis())
                .unwrap_or_default();
            Ok(ms.to_string())
        }
        Builtin::RandomInt => {
            let min = int_arg(builtin, args[0], scope)?;
            let max = int_arg(builtin, args[1], scope)?;
            if min > max {
                return Err(CallError::EmptyRange { min, max });
            }
            Ok(rand::rng().random_range(min..=max).to_string())
        }
        Builtin::RandomString => {
            let n = int_arg(builtin, args[0], scope)?;
            let len = usize::try_from(n)
                .ok()
                .filter(|&len| len <= MAX_RANDOM_STRING)
                .ok_or(CallError::Length(n))?;
            Ok(rand::rng()
                .sample_iter(&Alphanumeric)
                .take(len)
                .map(char::from)
                .collect())
        }
    }
}

fn int_arg(name: Builtin, arg: &str, scope: &ScopeView<'_>) -> Result<i64, CallError> {
    if let Ok(n) = arg.parse::<i64>() {
        return Ok(n);
    }

    scope
        .get(arg)
        .and_then(|v| v.as_text())
        .and_then(|s| s.trim().parse::<i64>().ok())
        .ok_or_else(|| CallError::NotInteger {
            name,
            arg: arg.to_string(),
        })
}
