//! Unified JSON logging with custom format.
//!
//! Log format:
//! ```json
//! {"ts":"2024-12-28T15:04:05.123Z","level":"info","type":"app","msg":"Server started","ctx":{"service":"tokio_wsgi"},"data":{}}
//! ```
//!
//! Events with target `access` become `"type":"access"` entries whose
//! message reads `METHOD /path STATUS`. In debug mode a human-readable
//! fmt layer is installed instead.

use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

/// Install the global subscriber. Later calls are ignored.
pub fn init(config: &LoggingConfig, debug: bool) {
    let filter = EnvFilter::try_new(effective_filter(config, debug))
        .unwrap_or_else(|_| EnvFilter::new("tokio_wsgi=info"));

    let result = if debug {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .event_format(JsonFormatter::new(config.service_name.clone())),
            )
            .try_init()
    };

    if result.is_err() {
        tracing::debug!("global subscriber already installed");
    }
}

/// Debug mode raises the default filter to debug for this crate; an
/// explicit LOG_LEVEL or RUST_LOG is kept as is.
fn effective_filter(config: &LoggingConfig, debug: bool) -> String {
    if debug && config.filter == LoggingConfig::default().filter {
        "tokio_wsgi=debug".to_string()
    } else {
        config.filter.clone()
    }
}

/// Custom JSON formatter for tracing.
pub struct JsonFormatter {
    service_name: String,
}

impl JsonFormatter {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }

    fn entry(&self, level: &Level, target: &str, visitor: FieldVisitor, ts: &str) -> serde_json::Value {
        let level_str = match *level {
            Level::TRACE | Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };

        // Determine log type from target
        let log_type = if target == "access" {
            "access"
        } else if *level == Level::ERROR {
            "error"
        } else {
            "app"
        };

        let FieldVisitor {
            message,
            fields: mut data,
        } = visitor;

        let msg = if log_type == "access" {
            let method = data.get("method").and_then(|v| v.as_str()).unwrap_or("?");
            let path = data.get("path").and_then(|v| v.as_str()).unwrap_or("?");
            let status = data.get("status").and_then(|v| v.as_u64()).unwrap_or(0);
            format!("{} {} {}", method, path, status)
        } else {
            message.unwrap_or_default()
        };

        let mut ctx = serde_json::Map::new();
        ctx.insert("service".into(), serde_json::json!(&self.service_name));
        if let Some(request_id) = data.remove("request_id") {
            ctx.insert("request_id".into(), request_id);
        }

        serde_json::json!({
            "ts": ts,
            "level": level_str,
            "type": log_type,
            "msg": msg,
            "ctx": ctx,
            "data": data,
        })
    }
}

impl<S, N> FormatEvent<S, N> for JsonFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        let meta = event.metadata();

        let mut visitor = FieldVisitor::new();
        event.record(&mut visitor);

        let ts = Iso8601Timestamp::now();
        let entry = self.entry(meta.level(), meta.target(), visitor, ts.as_str());

        writeln!(
            writer,
            "{}",
            serde_json::to_string(&entry).unwrap_or_default()
        )
    }
}

/// Field visitor for collecting tracing fields.
struct FieldVisitor {
    message: Option<String>,
    fields: HashMap<String, serde_json::Value>,
}

impl FieldVisitor {
    fn new() -> Self {
        Self {
            message: None,
            fields: HashMap::new(),
        }
    }
}

impl tracing::field::Visit for FieldVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = Some(format!("{:?}", value).trim_matches('"').to_string());
        } else {
            self.fields.insert(
                field.name().to_string(),
                serde_json::Value::String(format!("{:?}", value)),
            );
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.fields.insert(
                field.name().to_string(),
                serde_json::Value::String(value.to_string()),
            );
        }
    }

    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.fields
            .insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.fields
            .insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_f64(&mut self, field: &tracing::field::Field, value: f64) {
        self.fields
            .insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.fields
            .insert(field.name().to_string(), serde_json::json!(value));
    }
}

// ============================================================================
// ISO 8601 timestamp formatting (zero heap allocation)
// ============================================================================

/// ISO 8601 timestamp buffer - exactly 24 bytes: "2024-01-15T10:30:00.123Z"
#[derive(Clone, Copy)]
pub struct Iso8601Timestamp {
    buf: [u8; 24],
}

impl Iso8601Timestamp {
    #[inline]
    pub fn now() -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self::from_duration(now)
    }

    /// Create from a Duration since UNIX_EPOCH.
    pub fn from_duration(duration: Duration) -> Self {
        let secs = duration.as_secs();
        let millis = duration.subsec_millis();

        let day_secs = secs % 86400;
        let hours = (day_secs / 3600) as u8;
        let minutes = ((day_secs % 3600) / 60) as u8;
        let seconds = (day_secs % 60) as u8;

        // Days since epoch
        let mut remaining = (secs / 86400) as i64;
        let mut year = 1970u16;
        loop {
            let year_days = if is_leap_year(year) { 366 } else { 365 };
            if remaining < year_days {
                break;
            }
            remaining -= year_days;
            year += 1;
        }

        let month_days: [u8; 12] = if is_leap_year(year) {
            [31, 29, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31]
        } else {
            [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31]
        };

        let mut month = 1u8;
        for &days_in_month in &month_days {
            if remaining < days_in_month as i64 {
                break;
            }
            remaining -= days_in_month as i64;
            month += 1;
        }
        let day = (remaining + 1) as u8;

        let mut buf = [0u8; 24];
        write_digits(&mut buf[0..4], year as u32);
        buf[4] = b'-';
        write_digits(&mut buf[5..7], month as u32);
        buf[7] = b'-';
        write_digits(&mut buf[8..10], day as u32);
        buf[10] = b'T';
        write_digits(&mut buf[11..13], hours as u32);
        buf[13] = b':';
        write_digits(&mut buf[14..16], minutes as u32);
        buf[16] = b':';
        write_digits(&mut buf[17..19], seconds as u32);
        buf[19] = b'.';
        write_digits(&mut buf[20..23], millis);
        buf[23] = b'Z';

        Self { buf }
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        // Only ASCII digits and punctuation are ever written
        std::str::from_utf8(&self.buf).unwrap_or_default()
    }
}

impl std::fmt::Display for Iso8601Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::fmt::Debug for Iso8601Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[inline]
const fn is_leap_year(year: u16) -> bool {
    year % 4 == 0 && (year % 100 != 0 || year % 400 == 0)
}

/// Zero-padded decimal, as many digits as `buf` is long.
#[inline]
fn write_digits(buf: &mut [u8], mut val: u32) {
    for slot in buf.iter_mut().rev() {
        *slot = b'0' + (val % 10) as u8;
        val /= 10;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iso8601_timestamp_format() {
        let ts = Iso8601Timestamp::from_duration(Duration::new(1705315845, 123_000_000));
        assert_eq!(ts.as_str(), "2024-01-15T10:50:45.123Z");
        assert_eq!(format!("{}", ts), "2024-01-15T10:50:45.123Z");
    }

    #[test]
    fn test_iso8601_timestamp_epoch_and_leap_day() {
        assert_eq!(
            Iso8601Timestamp::from_duration(Duration::ZERO).as_str(),
            "1970-01-01T00:00:00.000Z"
        );
        assert_eq!(
            Iso8601Timestamp::from_duration(Duration::new(1709208000, 500_000_000)).as_str(),
            "2024-02-29T12:00:00.500Z"
        );
    }

    #[test]
    fn test_access_entry() {
        let formatter = JsonFormatter::new("demo");
        let mut visitor = FieldVisitor::new();
        visitor.fields.insert("method".into(), serde_json::json!("GET"));
        visitor.fields.insert("path".into(), serde_json::json!("/plain"));
        visitor.fields.insert("status".into(), serde_json::json!(200u64));
        visitor.fields.insert("request_id".into(), serde_json::json!("abc123"));

        let entry = formatter.entry(&Level::INFO, "access", visitor, "2024-01-15T10:50:45.123Z");
        assert_eq!(entry["type"], "access");
        assert_eq!(entry["msg"], "GET /plain 200");
        assert_eq!(entry["ctx"]["service"], "demo");
        assert_eq!(entry["ctx"]["request_id"], "abc123");
        assert!(entry["data"].get("request_id").is_none());
    }

    #[test]
    fn test_error_entry_type() {
        let formatter = JsonFormatter::new("demo");
        let mut visitor = FieldVisitor::new();
        visitor.message = Some("boom".into());

        let entry = formatter.entry(&Level::ERROR, "tokio_wsgi::app", visitor, "ts");
        assert_eq!(entry["type"], "error");
        assert_eq!(entry["level"], "error");
        assert_eq!(entry["msg"], "boom");
    }

    #[test]
    fn test_effective_filter() {
        let config = LoggingConfig::default();
        assert_eq!(effective_filter(&config, false), "tokio_wsgi=info");
        assert_eq!(effective_filter(&config, true), "tokio_wsgi=debug");

        let custom = LoggingConfig {
            filter: "hyper=warn".into(),
            ..LoggingConfig::default()
        };
        assert_eq!(effective_filter(&custom, true), "hyper=warn");
    }
}
