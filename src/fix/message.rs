//! FIX 4.2 wire codec (C1) and typed message schema (C2).
//!
//! A message is tag=value pairs separated by the SOH byte (0x01), framed by
//! `BeginString`/`BodyLength`/`CheckSum`. [`try_parse_frame`] stream-parses an
//! append-only buffer, returning `Ok(None)` when more bytes are needed and
//! `Err(BrokerError::WireFraming)` when a complete frame fails validation.

use crate::error::BrokerError;
use crate::types::{ExecType, Execution, Order, OrderStatus, Side, TimeInForce};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::io::{self, Write};

pub const FIX_SOH: u8 = 0x01;
pub const BEGIN_STRING: &[u8] = b"8=FIX.4.2";

/// A decoded FIX message as tag -> value. Tags 8, 9, 10 are consumed by framing
/// and are not present in the map handed to schema decoders.
pub type FixMessage = HashMap<u32, String>;

/// Parse the first complete message at the start of `buf`.
///
/// Returns `Ok(None)` when `buf` does not yet contain a complete frame (the
/// caller should read more bytes and retry). Returns `Ok(Some((msg, consumed)))`
/// on a validated frame; the caller must drop the first `consumed` bytes of
/// `buf` before parsing again. Returns `Err` for a bad `BeginString` or a
/// checksum mismatch — both are fatal to the session (§4.1).
pub fn try_parse_frame(buf: &[u8]) -> Result<Option<(FixMessage, usize)>, BrokerError> {
    let soh1 = match buf.iter().position(|&b| b == FIX_SOH) {
        Some(p) => p,
        None => return Ok(None),
    };
    if &buf[..soh1] != BEGIN_STRING {
        return Err(BrokerError::WireFraming(format!(
            "expected BeginString {}",
            std::str::from_utf8(BEGIN_STRING).unwrap_or("FIX.4.2")
        )));
    }

    let rest = &buf[soh1 + 1..];
    let soh2_rel = match rest.iter().position(|&b| b == FIX_SOH) {
        Some(p) => p,
        None => return Ok(None),
    };
    let tag9_field = std::str::from_utf8(&rest[..soh2_rel])
        .map_err(|_| BrokerError::WireFraming("non-UTF8 BodyLength field".into()))?;
    let body_len_str = tag9_field
        .strip_prefix("9=")
        .ok_or_else(|| BrokerError::WireFraming("expected tag 9 (BodyLength) after BeginString".into()))?;
    let body_len: usize = body_len_str
        .parse()
        .map_err(|_| BrokerError::WireFraming("invalid BodyLength".into()))?;

    let body_start = soh1 + 1 + soh2_rel + 1;
    let checksum_start = body_start + body_len;
    let checksum_field_len = 7; // "10=" + 3 digits + SOH
    let msg_end = checksum_start + checksum_field_len;
    if buf.len() < msg_end {
        return Ok(None);
    }
    if &buf[checksum_start..checksum_start + 3] != b"10=" {
        return Err(BrokerError::WireFraming("expected CheckSum field at BodyLength boundary".into()));
    }
    if buf[msg_end - 1] != FIX_SOH {
        return Err(BrokerError::WireFraming("CheckSum field not SOH-terminated".into()));
    }
    let checksum_digits = std::str::from_utf8(&buf[checksum_start + 3..checksum_start + 6])
        .map_err(|_| BrokerError::WireFraming("non-UTF8 CheckSum digits".into()))?;
    let expected_checksum: u32 = checksum_digits
        .parse()
        .map_err(|_| BrokerError::WireFraming("invalid CheckSum digits".into()))?;
    let actual_checksum: u32 = buf[..checksum_start].iter().map(|&b| b as u32).sum::<u32>() % 256;
    if actual_checksum != expected_checksum {
        return Err(BrokerError::WireFraming(format!(
            "checksum mismatch: expected {:03} got {:03}",
            expected_checksum, actual_checksum
        )));
    }

    let mut msg = FixMessage::new();
    let mut pos = 0;
    while pos < msg_end {
        let eq = match buf[pos..msg_end].iter().position(|&b| b == b'=') {
            Some(p) => p + pos,
            None => break,
        };
        let tag_str = std::str::from_utf8(&buf[pos..eq])
            .map_err(|_| BrokerError::WireFraming("non-UTF8 tag".into()))?;
        let tag: u32 = tag_str
            .parse()
            .map_err(|_| BrokerError::WireFraming(format!("non-numeric tag {tag_str}")))?;
        pos = eq + 1;
        let soh = buf[pos..msg_end]
            .iter()
            .position(|&b| b == FIX_SOH)
            .map(|p| p + pos)
            .unwrap_or(msg_end);
        let value = std::str::from_utf8(&buf[pos..soh])
            .map_err(|_| BrokerError::WireFraming("non-UTF8 value".into()))?
            .to_string();
        // First-occurrence semantics: this system has no repeating groups, so a
        // later tag collision is a malformed duplicate, not an update. Tags 8/9/10
        // belong to framing and are dropped here so the map handed to schema
        // decoders holds only application fields.
        if tag != 8 && tag != 9 && tag != 10 {
            msg.entry(tag).or_insert(value);
        }
        pos = soh + 1;
    }
    Ok(Some((msg, msg_end)))
}

/// Builds one FIX message. `BeginString`, `BodyLength`, and `CheckSum` are
/// computed on [`FixWriter::write`]; `SendingTime` is inserted automatically
/// if not already set.
pub struct FixWriter {
    fields: Vec<(u32, String)>,
}

impl FixWriter {
    pub fn new() -> Self {
        Self { fields: Vec::new() }
    }

    pub fn set(&mut self, tag: u32, value: impl Into<String>) -> &mut Self {
        self.fields.push((tag, value.into()));
        self
    }

    /// Serializes to `out`, appending `8=FIX.4.2`, `9=<len>`, the body, and `10=<checksum>`.
    pub fn write(&self, out: &mut impl Write) -> io::Result<()> {
        let has_sending_time = self.fields.iter().any(|(t, _)| *t == 52);
        let mut body = Vec::new();
        for (tag, value) in &self.fields {
            if *tag == 8 || *tag == 9 || *tag == 10 {
                continue;
            }
            write!(body, "{}={}\x01", tag, value)?;
        }
        if !has_sending_time {
            write!(body, "52={}\x01", format_sending_time(None))?;
        }
        let header = format!("8=FIX.4.2\x019={}\x01", body.len());
        let sum: u32 = header.bytes().chain(body.iter().copied()).map(|b| b as u32).sum::<u32>() % 256;
        write!(out, "{}", header)?;
        out.write_all(&body)?;
        write!(out, "10={:03}\x01", sum)?;
        Ok(())
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        let _ = self.write(&mut out);
        out
    }
}

impl Default for FixWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// `OrdType` as it appears on the wire, before admission decides whether the
/// lifecycle engine can act on it (§4.2 enumerations, §9 open question).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RawOrdType {
    Market,
    Limit,
    Stop,
    StopLimit,
}

impl RawOrdType {
    fn from_fix(code: &str) -> Option<Self> {
        match code {
            "1" => Some(RawOrdType::Market),
            "2" => Some(RawOrdType::Limit),
            "3" => Some(RawOrdType::Stop),
            "4" => Some(RawOrdType::StopLimit),
            _ => None,
        }
    }

    pub fn is_supported(self) -> bool {
        matches!(self, RawOrdType::Market | RawOrdType::Limit)
    }

    pub fn requires_price(self) -> bool {
        matches!(self, RawOrdType::Limit | RawOrdType::StopLimit)
    }
}

/// Decoded `NewOrderSingle` (35=D), before duplicate/symbol/lifecycle checks.
#[derive(Clone, Debug)]
pub struct NewOrderSingleFields {
    pub cl_ord_id: String,
    pub symbol: String,
    pub side: Side,
    pub raw_ord_type: RawOrdType,
    pub quantity: i64,
    pub limit_price: Option<Decimal>,
    pub time_in_force: TimeInForce,
}

fn required<'a>(fix: &'a FixMessage, tag: u32, name: &str) -> Result<&'a str, BrokerError> {
    fix.get(&tag)
        .map(|s| s.as_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| BrokerError::WireSchema(format!("missing {name} ({tag})")))
}

fn normalize_symbol(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

/// Decodes `NewOrderSingle` (§4.2, §4.5). Schema failures are `WireSchema` and
/// are surfaced by the caller as an `ExecutionReport(rejected)` (§7).
pub fn decode_new_order_single(fix: &FixMessage) -> Result<NewOrderSingleFields, BrokerError> {
    let cl_ord_id = required(fix, 11, "ClOrdID")?.to_string();
    let symbol = normalize_symbol(required(fix, 55, "Symbol")?);
    let side = Side::from_fix(required(fix, 54, "Side")?)
        .ok_or_else(|| BrokerError::WireSchema("invalid Side (54)".into()))?;
    let quantity: i64 = required(fix, 38, "OrderQty")?
        .parse()
        .map_err(|_| BrokerError::WireSchema("invalid OrderQty (38)".into()))?;
    if quantity <= 0 {
        return Err(BrokerError::WireSchema("OrderQty (38) must be positive".into()));
    }
    let raw_ord_type = RawOrdType::from_fix(required(fix, 40, "OrdType")?)
        .ok_or_else(|| BrokerError::WireSchema("invalid OrdType (40)".into()))?;
    let limit_price = if raw_ord_type.requires_price() {
        let p: Decimal = required(fix, 44, "Price")?
            .parse()
            .map_err(|_| BrokerError::WireSchema("invalid Price (44)".into()))?;
        if p <= Decimal::ZERO {
            return Err(BrokerError::WireSchema("Price (44) must be positive".into()));
        }
        Some(p)
    } else {
        None
    };
    let time_in_force = match fix.get(&59).map(|s| s.as_str()) {
        None => TimeInForce::Day,
        Some(code) => TimeInForce::from_fix(code)
            .ok_or_else(|| BrokerError::WireSchema("invalid TimeInForce (59)".into()))?,
    };
    Ok(NewOrderSingleFields {
        cl_ord_id,
        symbol,
        side,
        raw_ord_type,
        quantity,
        limit_price,
        time_in_force,
    })
}

/// Decoded `OrderCancelRequest` (35=F).
#[derive(Clone, Debug)]
pub struct OrderCancelRequestFields {
    pub cl_ord_id: String,
    pub orig_cl_ord_id: String,
    pub symbol: String,
    pub side: Side,
}

pub fn decode_order_cancel_request(fix: &FixMessage) -> Result<OrderCancelRequestFields, BrokerError> {
    let cl_ord_id = required(fix, 11, "ClOrdID")?.to_string();
    let orig_cl_ord_id = required(fix, 41, "OrigClOrdID")?.to_string();
    let symbol = normalize_symbol(required(fix, 55, "Symbol")?);
    let side = Side::from_fix(required(fix, 54, "Side")?)
        .ok_or_else(|| BrokerError::WireSchema("invalid Side (54)".into()))?;
    Ok(OrderCancelRequestFields {
        cl_ord_id,
        orig_cl_ord_id,
        symbol,
        side,
    })
}

/// Builds a Logon (35=A) reply: `EncryptMethod=0`, the offered `HeartBtInt`, and the session's next seq.
pub fn encode_logon(broker_id: &str, peer_id: &str, seq: u32, heart_bt_int: u32) -> Vec<u8> {
    let mut w = FixWriter::new();
    w.set(35, "A")
        .set(49, broker_id)
        .set(56, peer_id)
        .set(34, seq.to_string())
        .set(98, "0")
        .set(108, heart_bt_int.to_string());
    w.to_bytes()
}

/// Builds a Heartbeat (35=0), optionally echoing `TestReqID` (112).
pub fn encode_heartbeat(broker_id: &str, peer_id: &str, seq: u32, test_req_id: Option<&str>) -> Vec<u8> {
    let mut w = FixWriter::new();
    w.set(35, "0").set(49, broker_id).set(56, peer_id).set(34, seq.to_string());
    if let Some(id) = test_req_id {
        w.set(112, id);
    }
    w.to_bytes()
}

/// Builds an `ExecutionReport` (35=8) for a committed lifecycle transition (§4.6).
#[allow(clippy::too_many_arguments)]
pub fn encode_execution_report(
    broker_id: &str,
    order: &Order,
    exec_id: &str,
    exec_type: ExecType,
    avg_price: Decimal,
    last: Option<&Execution>,
    seq: u32,
) -> Vec<u8> {
    let mut w = FixWriter::new();
    w.set(35, "8")
        .set(49, broker_id)
        .set(56, &order.sender_id)
        .set(34, seq.to_string())
        .set(11, &order.cl_ord_id)
        .set(17, exec_id)
        .set(150, exec_type.to_fix())
        .set(39, order.status.to_fix())
        .set(55, &order.symbol)
        .set(54, order.side.to_fix())
        .set(38, order.quantity.to_string())
        .set(40, order.order_type.to_fix())
        .set(14, order.filled_quantity.to_string())
        .set(151, order.remaining_quantity.to_string())
        .set(6, avg_price.to_string());
    if let Some(exec) = last {
        w.set(32, exec.exec_quantity.to_string());
        w.set(31, exec.exec_price.to_string());
    }
    w.to_bytes()
}

/// Builds an `ExecutionReport(rejected)` for an order that never made it into the store
/// (schema failure, duplicate ClOrdID, unsupported order type — §4.5, §7).
pub fn encode_rejection(
    broker_id: &str,
    peer_id: &str,
    cl_ord_id: &str,
    symbol: &str,
    side: Side,
    quantity: i64,
    reason: &str,
    seq: u32,
) -> Vec<u8> {
    let mut w = FixWriter::new();
    w.set(35, "8")
        .set(49, broker_id)
        .set(56, peer_id)
        .set(34, seq.to_string())
        .set(11, cl_ord_id)
        .set(17, "NONE")
        .set(150, ExecType::Rejected.to_fix())
        .set(39, OrderStatus::Rejected.to_fix())
        .set(55, symbol)
        .set(54, side.to_fix())
        .set(38, quantity.to_string())
        .set(14, "0")
        .set(151, "0")
        .set(6, "0")
        .set(58, reason);
    w.to_bytes()
}

/// Builds an `OrderCancelReject` (35=9): `CxlRejResponseTo=1` (cancel request), `CxlRejReason` per §7.
pub fn encode_order_cancel_reject(
    broker_id: &str,
    peer_id: &str,
    cl_ord_id: &str,
    orig_cl_ord_id: &str,
    cxl_rej_reason: &str,
    seq: u32,
) -> Vec<u8> {
    let mut w = FixWriter::new();
    w.set(35, "9")
        .set(49, broker_id)
        .set(56, peer_id)
        .set(34, seq.to_string())
        .set(11, cl_ord_id)
        .set(41, orig_cl_ord_id)
        .set(434, "1")
        .set(102, cxl_rej_reason);
    w.to_bytes()
}

/// Formats a UTC timestamp as `YYYYMMDD-HH:MM:SS` (§4.1). `None` uses the current time.
pub fn format_sending_time(at: Option<chrono::DateTime<chrono::Utc>>) -> String {
    let at = at.unwrap_or_else(chrono::Utc::now);
    at.format("%Y%m%d-%H:%M:%S").to_string()
}
