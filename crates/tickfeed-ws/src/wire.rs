//! Wire-format types for the upstream ticker feed.
//!
//! Outgoing control frames use the SUBSCRIBE/UNSUBSCRIBE envelope. Incoming
//! frames are classified once, at the decode boundary, into an explicit
//! tagged union (`Frame`) before any merge logic sees them: acknowledgment
//! envelopes carry a `result` field, data ticks carry a symbol field, and
//! everything else is `Unrecognized`.

use serde::{Deserialize, Serialize};
use tickfeed_core::ChannelKey;

/// Control method for subscription management.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ControlMethod {
    Subscribe,
    Unsubscribe,
}

/// Outgoing control frame:
/// `{"method": "SUBSCRIBE", "params": ["btcusdt@ticker"], "id": 1}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlRequest {
    pub method: ControlMethod,
    pub params: Vec<String>,
    pub id: u64,
}

impl ControlRequest {
    pub fn subscribe(channels: &[ChannelKey], id: u64) -> Self {
        Self {
            method: ControlMethod::Subscribe,
            params: channels.iter().map(|c| c.as_str().to_string()).collect(),
            id,
        }
    }

    pub fn unsubscribe(channels: &[ChannelKey], id: u64) -> Self {
        Self {
            method: ControlMethod::Unsubscribe,
            params: channels.iter().map(|c| c.as_str().to_string()).collect(),
            id,
        }
    }
}

/// Control acknowledgment envelope, distinguished from data ticks by the
/// presence of a `result` field (typically `null`).
#[derive(Debug, Clone, Deserialize)]
pub struct ControlAck {
    pub result: serde_json::Value,
    #[serde(default)]
    pub id: Option<u64>,
}

/// 24h ticker event. Upstream sends all numeric fields as strings; fields
/// other than the pair symbol may be absent and are merged best-effort.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickerEvent {
    /// Traded pair, e.g. "BTCUSDT".
    #[serde(rename = "s")]
    pub pair: String,
    /// Last traded price.
    #[serde(rename = "c", default, skip_serializing_if = "Option::is_none")]
    pub last_price: Option<String>,
    /// 24h price change percent.
    #[serde(rename = "P", default, skip_serializing_if = "Option::is_none")]
    pub change_percent: Option<String>,
    /// 24h quote asset volume.
    #[serde(rename = "q", default, skip_serializing_if = "Option::is_none")]
    pub quote_volume: Option<String>,
    /// Event time in epoch milliseconds.
    #[serde(rename = "E", default, skip_serializing_if = "Option::is_none")]
    pub event_time: Option<i64>,
}

/// One classified incoming frame.
#[derive(Debug, Clone)]
pub enum Frame {
    /// Subscription acknowledgment; never market data.
    Ack(ControlAck),
    /// Data tick for one symbol.
    Ticker(Box<TickerEvent>),
    /// Valid JSON of a shape this client does not consume.
    Unrecognized,
}

impl Frame {
    /// Classify one raw text frame.
    ///
    /// Only syntactically malformed JSON is an error; any well-formed frame
    /// of unknown shape decodes to `Unrecognized` so that a single odd
    /// message never disturbs the stream.
    pub fn decode(raw: &str) -> Result<Frame, serde_json::Error> {
        let value: serde_json::Value = serde_json::from_str(raw)?;
        Ok(Self::classify(value))
    }

    fn classify(value: serde_json::Value) -> Frame {
        // Combined-stream envelope: {"stream": "...", "data": {...}}.
        if value.get("stream").is_some() {
            if let Some(data) = value.get("data") {
                return Self::classify(data.clone());
            }
            return Frame::Unrecognized;
        }

        if value.get("result").is_some() {
            return match serde_json::from_value::<ControlAck>(value) {
                Ok(ack) => Frame::Ack(ack),
                Err(_) => Frame::Unrecognized,
            };
        }

        if value.get("s").is_some() {
            return match serde_json::from_value::<TickerEvent>(value) {
                Ok(event) => Frame::Ticker(Box::new(event)),
                Err(_) => Frame::Unrecognized,
            };
        }

        Frame::Unrecognized
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tickfeed_core::Symbol;

    #[test]
    fn test_control_request_wire_shape() {
        let channels = [
            ChannelKey::ticker(&Symbol::new("BTC"), "USDT"),
            ChannelKey::ticker(&Symbol::new("ETH"), "USDT"),
        ];
        let request = ControlRequest::subscribe(&channels, 7);
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(
            value,
            json!({
                "method": "SUBSCRIBE",
                "params": ["btcusdt@ticker", "ethusdt@ticker"],
                "id": 7
            })
        );
    }

    #[test]
    fn test_unsubscribe_method_uppercase() {
        let channels = [ChannelKey::ticker(&Symbol::new("SOL"), "USDT")];
        let request = ControlRequest::unsubscribe(&channels, 8);
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["method"], "UNSUBSCRIBE");
    }

    #[test]
    fn test_decode_ack() {
        let frame = Frame::decode(r#"{"result":null,"id":1}"#).unwrap();
        match frame {
            Frame::Ack(ack) => {
                assert!(ack.result.is_null());
                assert_eq!(ack.id, Some(1));
            }
            other => panic!("expected Ack, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_ticker() {
        let raw = r#"{"e":"24hrTicker","E":1700000000000,"s":"BTCUSDT","P":"2.50","c":"50000.00","q":"1234567.89"}"#;
        let frame = Frame::decode(raw).unwrap();
        match frame {
            Frame::Ticker(event) => {
                assert_eq!(event.pair, "BTCUSDT");
                assert_eq!(event.last_price.as_deref(), Some("50000.00"));
                assert_eq!(event.change_percent.as_deref(), Some("2.50"));
                assert_eq!(event.quote_volume.as_deref(), Some("1234567.89"));
                assert_eq!(event.event_time, Some(1700000000000));
            }
            other => panic!("expected Ticker, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_minimal_ticker() {
        // Only the symbol and close price, as in sparse mini-ticker frames.
        let frame = Frame::decode(r#"{"s":"BTCUSDT","c":"50000"}"#).unwrap();
        assert!(matches!(frame, Frame::Ticker(_)));
    }

    #[test]
    fn test_decode_combined_stream_envelope() {
        let raw = r#"{"stream":"btcusdt@ticker","data":{"s":"BTCUSDT","c":"50000"}}"#;
        let frame = Frame::decode(raw).unwrap();
        match frame {
            Frame::Ticker(event) => assert_eq!(event.pair, "BTCUSDT"),
            other => panic!("expected Ticker, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_unknown_shape() {
        let frame = Frame::decode(r#"{"hello":"world"}"#).unwrap();
        assert!(matches!(frame, Frame::Unrecognized));
    }

    #[test]
    fn test_decode_malformed_json_is_error() {
        assert!(Frame::decode("{not json").is_err());
    }

    #[test]
    fn test_ack_wins_over_ticker_shape() {
        // A frame carrying both `result` and `s` is a control response.
        let frame = Frame::decode(r#"{"result":null,"s":"BTCUSDT"}"#).unwrap();
        assert!(matches!(frame, Frame::Ack(_)));
    }
}
