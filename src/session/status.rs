//! Per-platform status decoding and duration formatting.
//!
//! Neither engine pushes live duration or counter updates, so the monitor
//! polls a raw status payload and runs it through the decoder matching the
//! platform. The payloads are shaped differently per platform; decoders
//! normalize both into one [`VpnStatus`] record.

use crate::session::types::{Platform, VpnStage, VpnStatus};
use chrono::{DateTime, Utc};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Duration formatting
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Format an elapsed span as zero-padded `HH:MM:SS`.
///
/// Hours are not wrapped at 24; minutes and seconds are each mod 60.
/// Negative spans (clock skew between the engine timestamp and local
/// wall-clock) are formatted as their absolute value.
pub fn format_duration(elapsed: chrono::Duration) -> String {
    let secs = elapsed.num_seconds().unsigned_abs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Per-platform decoders
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Counters pulled out of a raw status payload, before duration is
/// computed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedCounters {
    pub connected_on: Option<DateTime<Utc>>,
    pub bytes_in: String,
    pub bytes_out: String,
    pub packets_in: String,
    pub packets_out: String,
}

/// Decodes one platform's raw status payload.
///
/// `None` means the payload is unusable (stale, malformed, truncated) and
/// the caller should report the empty status – decoding problems are never
/// errors. New engine flavors plug in by implementing this trait; the
/// monitor only ever sees the interface.
pub trait StatusDecoder: Send + Sync {
    fn decode(
        &self,
        payload: &str,
        fallback_connected_at: Option<DateTime<Utc>>,
    ) -> Option<DecodedCounters>;
}

/// Underscore-delimited flat payload:
/// `<connected_on>_<packets_in>_<packets_out>_<bytes_in>_<bytes_out>`.
pub struct IosStatusDecoder;

impl StatusDecoder for IosStatusDecoder {
    fn decode(
        &self,
        payload: &str,
        _fallback_connected_at: Option<DateTime<Utc>>,
    ) -> Option<DecodedCounters> {
        let fields: Vec<&str> = payload.split('_').collect();
        if fields.len() != 5 {
            log::debug!("ios status payload has {} fields, want 5", fields.len());
            return None;
        }
        let connected_on = match DateTime::parse_from_rfc3339(fields[0].trim()) {
            Ok(ts) => ts.with_timezone(&Utc),
            Err(e) => {
                log::debug!("ios status timestamp unparsable: {}", e);
                return None;
            }
        };
        Some(DecodedCounters {
            connected_on: Some(connected_on),
            packets_in: fields[1].trim().to_string(),
            packets_out: fields[2].trim().to_string(),
            bytes_in: fields[3].trim().to_string(),
            bytes_out: fields[4].trim().to_string(),
        })
    }
}

/// Structured key-value payload with `connected_on`, `byte_in`, `byte_out`.
///
/// Packet counts are not reported separately on this platform and are set
/// equal to the byte counts.
pub struct AndroidStatusDecoder;

impl StatusDecoder for AndroidStatusDecoder {
    fn decode(
        &self,
        payload: &str,
        fallback_connected_at: Option<DateTime<Utc>>,
    ) -> Option<DecodedCounters> {
        let map: serde_json::Value = match serde_json::from_str(payload) {
            Ok(v) => v,
            Err(e) => {
                log::debug!("android status payload unparsable: {}", e);
                return None;
            }
        };
        let connected_on = map
            .get("connected_on")
            .map(|v| match v {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .and_then(|s| DateTime::parse_from_rfc3339(s.trim()).ok())
            .map(|ts| ts.with_timezone(&Utc))
            .or(fallback_connected_at);

        let bytes_in = counter_field(&map, "byte_in");
        let bytes_out = counter_field(&map, "byte_out");
        Some(DecodedCounters {
            connected_on,
            packets_in: bytes_in.clone(),
            packets_out: bytes_out.clone(),
            bytes_in,
            bytes_out,
        })
    }
}

/// Read a counter field, defaulting to `"0"` when absent, null, or blank
/// after trimming.
fn counter_field(map: &serde_json::Value, key: &str) -> String {
    match map.get(key) {
        Some(serde_json::Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        Some(serde_json::Value::Number(n)) => n.to_string(),
        _ => "0".to_string(),
    }
}

impl Platform {
    /// The decoder matching this engine flavor.
    pub fn decoder(&self) -> &'static dyn StatusDecoder {
        match self {
            Self::Android => &AndroidStatusDecoder,
            Self::Ios => &IosStatusDecoder,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Sampling
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Turn a raw status payload into a normalized [`VpnStatus`].
///
/// Outside the `Connected` stage the payload is meaningless or stale and is
/// not even parsed – the empty status comes back unconditionally. An absent
/// or undecodable payload also degrades to the empty status. The duration
/// anchor is the decoded `connected_on` when present, otherwise
/// `fallback_connected_at` (the monitor's locally tracked connect instant);
/// with no anchor at all the duration stays `00:00:00`.
pub fn sample_status(
    stage: VpnStage,
    payload: Option<&str>,
    decoder: &dyn StatusDecoder,
    fallback_connected_at: Option<DateTime<Utc>>,
) -> VpnStatus {
    if stage != VpnStage::Connected {
        return VpnStatus::empty();
    }
    let Some(payload) = payload else {
        return VpnStatus::empty();
    };
    let payload = payload.trim();
    if payload.is_empty() {
        return VpnStatus::empty();
    }
    match decoder.decode(payload, fallback_connected_at) {
        Some(counters) => {
            let duration = counters
                .connected_on
                .map(|t| format_duration(Utc::now().signed_duration_since(t)))
                .unwrap_or_else(|| "00:00:00".to_string());
            VpnStatus {
                connected_since: counters.connected_on,
                duration,
                bytes_in: counters.bytes_in,
                bytes_out: counters.bytes_out,
                packets_in: counters.packets_in,
                packets_out: counters.packets_out,
            }
        }
        None => VpnStatus::empty(),
    }
}
