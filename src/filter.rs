use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use chrono::{DateTime, Duration, Utc};
use dtparse::Parser;
use fnv::FnvHashMap;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SchleppnetzError;
use crate::node::json_text;
use crate::tracker::SiteContext;

/// One step of a field's value-transform pipeline.
///
/// In a schema file a step is either a bare name (`"parseSize"`) or a
/// parameterized call (`{"name": "replace", "args": [",", ""]}`). Inline
/// closures can be appended at runtime but never round-trip through serde.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterStep {
    /// A registered transform, no arguments.
    Name(String),
    /// A registered transform with arguments.
    Call {
        name: String,
        #[serde(default)]
        args: Vec<Value>,
    },
    /// An inline closure.
    #[serde(skip)]
    Custom(CustomFilter),
}

impl FilterStep {
    pub fn name(name: impl Into<String>) -> Self {
        FilterStep::Name(name.into())
    }

    pub fn call(name: impl Into<String>, args: Vec<Value>) -> Self {
        FilterStep::Call {
            name: name.into(),
            args,
        }
    }

    pub fn custom<F>(filter: F) -> Self
    where
        F: Fn(Value, &FilterContext<'_>) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        FilterStep::Custom(CustomFilter(Arc::new(filter)))
    }
}

/// An inline transform closure.
#[derive(Clone)]
pub struct CustomFilter(Arc<dyn Fn(Value, &FilterContext<'_>) -> anyhow::Result<Value> + Send + Sync>);

impl CustomFilter {
    pub(crate) fn call(&self, value: Value, ctx: &FilterContext<'_>) -> anyhow::Result<Value> {
        (self.0)(value, ctx)
    }
}

impl fmt::Debug for CustomFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CustomFilter")
    }
}

/// Read-only context handed to every filter and element handler.
#[derive(Debug, Clone, Copy)]
pub struct FilterContext<'a> {
    /// The site the document came from.
    pub site: &'a SiteContext,
    /// Reference instant for age-style date strings.
    pub now: DateTime<Utc>,
}

impl<'a> FilterContext<'a> {
    pub fn new(site: &'a SiteContext) -> Self {
        Self {
            site,
            now: Utc::now(),
        }
    }

    /// Pins the reference instant, mainly useful in tests.
    pub fn with_now(site: &'a SiteContext, now: DateTime<Utc>) -> Self {
        Self { site, now }
    }
}

type BuiltinFilter =
    Arc<dyn Fn(Value, &[Value], &FilterContext<'_>) -> anyhow::Result<Value> + Send + Sync>;

/// Named transforms a schema's filter pipelines can refer to.
///
/// `Default` carries the built-in vocabulary; trackers may register further
/// site-specific transforms under their own names.
pub struct FilterRegistry {
    table: FnvHashMap<String, BuiltinFilter>,
}

impl FilterRegistry {
    /// Registers a transform under `name`, replacing any previous one.
    pub fn insert<F>(&mut self, name: impl Into<String>, filter: F)
    where
        F: Fn(Value, &[Value], &FilterContext<'_>) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.table.insert(name.into(), Arc::new(filter));
    }

    /// Runs `value` through `steps` in order.
    ///
    /// The first failing step aborts the pipeline; the caller decides whether
    /// that drops a field or a whole row.
    pub fn apply(
        &self,
        steps: &[FilterStep],
        mut value: Value,
        ctx: &FilterContext<'_>,
    ) -> Result<Value, SchleppnetzError> {
        for step in steps {
            value = match step {
                FilterStep::Name(name) => self.invoke(name, value, &[], ctx)?,
                FilterStep::Call { name, args } => self.invoke(name, value, args, ctx)?,
                FilterStep::Custom(filter) => {
                    filter
                        .call(value, ctx)
                        .map_err(|source| SchleppnetzError::Filter {
                            name: "<custom>".to_string(),
                            source,
                        })?
                }
            };
        }
        Ok(value)
    }

    fn invoke(
        &self,
        name: &str,
        value: Value,
        args: &[Value],
        ctx: &FilterContext<'_>,
    ) -> Result<Value, SchleppnetzError> {
        let filter = self
            .table
            .get(name)
            .ok_or_else(|| SchleppnetzError::UnknownFilter {
                name: name.to_string(),
            })?;
        filter(value, args, ctx).map_err(|source| SchleppnetzError::Filter {
            name: name.to_string(),
            source,
        })
    }
}

impl Default for FilterRegistry {
    fn default() -> Self {
        let mut registry = FilterRegistry {
            table: FnvHashMap::default(),
        };
        registry.insert("trim", |value, _, _: &FilterContext<'_>| {
            Ok(Value::String(json_text(&value).trim().to_string()))
        });
        registry.insert("parseNumber", |value, _, _: &FilterContext<'_>| {
            Ok(number_value(first_number(&json_text(&value)).unwrap_or(0.0)))
        });
        registry.insert("parseSize", |value, _, _: &FilterContext<'_>| {
            let text = json_text(&value);
            let bytes = size_in_bytes(&text)
                .or_else(|| first_number(&text).map(|n| n.max(0.0) as u64))
                .unwrap_or(0);
            Ok(Value::from(bytes))
        });
        registry.insert("parseDate", |value, _, _: &FilterContext<'_>| {
            match fuzzy_timestamp_ms(&json_text(&value)) {
                Some(ms) => Ok(Value::from(ms)),
                // Not a date; leave the value for downstream steps.
                None => Ok(value),
            }
        });
        registry.insert("parseTimeAgo", |value, _, ctx: &FilterContext<'_>| {
            match time_ago_ms(&json_text(&value), ctx.now) {
                Some(ms) => Ok(Value::from(ms)),
                None => Ok(value),
            }
        });
        registry.insert("replace", |value, args, _: &FilterContext<'_>| {
            let from = args.first().and_then(Value::as_str);
            let to = args.get(1).and_then(Value::as_str);
            match (from, to) {
                (Some(from), Some(to)) => {
                    Ok(Value::String(json_text(&value).replace(from, to)))
                }
                _ => Err(anyhow!("expected two string arguments (from, to)")),
            }
        });
        registry.insert("extract", |value, args, _: &FilterContext<'_>| {
            let pattern = args
                .first()
                .and_then(Value::as_str)
                .context("expected a pattern argument")?;
            let group = args.get(1).and_then(Value::as_u64).unwrap_or(1) as usize;
            let re = Regex::new(pattern)
                .with_context(|| format!("invalid pattern {:?}", pattern))?;
            let text = json_text(&value);
            let caps = re
                .captures(&text)
                .with_context(|| format!("{:?} matched nothing", pattern))?;
            let hit = caps
                .get(group)
                .or_else(|| caps.get(0))
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();
            Ok(Value::String(hit))
        });
        registry.insert("querystring", |value, args, _: &FilterContext<'_>| {
            let key = args
                .first()
                .and_then(Value::as_str)
                .context("expected a parameter name argument")?;
            let text = json_text(&value);
            let query = text.split_once('?').map(|(_, q)| q).unwrap_or(&text);
            let query = query.split_once('#').map(|(q, _)| q).unwrap_or(query);
            let hit = url::form_urlencoded::parse(query.as_bytes())
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.into_owned())
                .unwrap_or_default();
            Ok(Value::String(hit))
        });
        registry
    }
}

impl fmt::Debug for FilterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.table.keys().collect();
        names.sort();
        f.debug_struct("FilterRegistry")
            .field("filters", &names)
            .finish()
    }
}

lazy_static! {
    static ref NUMBER: Regex = Regex::new(r"-?[\d,]+(?:\.\d+)?").unwrap();
    static ref SIZE: Regex = Regex::new(r"(?i)([\d.,]+)\s*([KMGTPE]?i?B)").unwrap();
    static ref AGE: Regex =
        Regex::new(r"(?i)([\d.]+)\s*(sec|min|hour|day|week|month|year)").unwrap();
}

/// First numeric token in `s`, group separators stripped.
pub(crate) fn first_number(s: &str) -> Option<f64> {
    NUMBER.find(s)?.as_str().replace(',', "").parse().ok()
}

fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

/// `"3.2 GiB"` -> bytes. Decimal unit names count as binary multiples, which
/// is how the sites themselves calculate.
pub(crate) fn size_in_bytes(s: &str) -> Option<u64> {
    let caps = SIZE.captures(s)?;
    let num: f64 = caps[1].replace(',', "").parse().ok()?;
    let exp = match caps[2].chars().next()?.to_ascii_uppercase() {
        'B' => 0,
        'K' => 1,
        'M' => 2,
        'G' => 3,
        'T' => 4,
        'P' => 5,
        'E' => 6,
        _ => return None,
    };
    Some((num * 1024f64.powi(exp)) as u64)
}

/// Fuzzy-parses a date out of arbitrary text, as ms since the epoch.
pub(crate) fn fuzzy_timestamp_ms(txt: &str) -> Option<i64> {
    let mut tzinfod = HashMap::new();
    tzinfod.insert("ET".to_string(), 14400);
    let parser = Parser::default();
    parser
        .parse(
            txt, None, None, true, /* turns on fuzzy mode */
            true, /* gives us the tokens that weren't recognized */
            None, false, &tzinfod,
        )
        .map(|(date, _, _)| date)
        .ok()
        .map(|date| date.and_utc().timestamp_millis())
}

/// `"1 week 2 days ago"` -> ms timestamp relative to `now`. Units accumulate;
/// months count as 30 days, years as 365.
pub(crate) fn time_ago_ms(txt: &str, now: DateTime<Utc>) -> Option<i64> {
    let mut seconds = 0f64;
    let mut matched = false;
    for caps in AGE.captures_iter(txt) {
        let n: f64 = caps[1].parse().ok()?;
        seconds += n * match caps[2].to_ascii_lowercase().as_str() {
            "sec" => 1.0,
            "min" => 60.0,
            "hour" => 3_600.0,
            "day" => 86_400.0,
            "week" => 604_800.0,
            "month" => 2_592_000.0,
            "year" => 31_536_000.0,
            _ => return None,
        };
        matched = true;
    }
    if !matched {
        return None;
    }
    Some((now - Duration::seconds(seconds as i64)).timestamp_millis())
}
