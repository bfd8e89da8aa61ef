//! Minimal RLP decoding of signed transactions
//!
//! Only what gas estimation needs: recipient, value, calldata and gas limit
//! for legacy, EIP-2930 (type 1) and EIP-1559 (type 2) envelopes. The sender
//! is supplied by the caller rather than recovered from the signature.

use serde_json::{json, Value};

use super::to_hex;
use crate::errors::ChainError;

#[derive(Debug, Clone, PartialEq)]
enum Rlp<'a> {
    Bytes(&'a [u8]),
    List(Vec<Rlp<'a>>),
}

impl<'a> Rlp<'a> {
    fn bytes(&self, field: &str) -> Result<&'a [u8], ChainError> {
        match self {
            Rlp::Bytes(b) => Ok(*b),
            Rlp::List(_) => Err(ChainError::Decode(format!("field '{}' is a list", field))),
        }
    }
}

fn be_len(bytes: &[u8]) -> Result<usize, ChainError> {
    if bytes.len() > std::mem::size_of::<usize>() {
        return Err(ChainError::Decode("length prefix too large".to_string()));
    }
    Ok(bytes.iter().fold(0usize, |acc, b| (acc << 8) | *b as usize))
}

fn take(input: &[u8], start: usize, len: usize) -> Result<(&[u8], &[u8]), ChainError> {
    let end = start
        .checked_add(len)
        .ok_or_else(|| ChainError::Decode("length overflow".to_string()))?;
    if end > input.len() {
        return Err(ChainError::Decode(format!(
            "truncated item: need {} bytes, have {}",
            end,
            input.len()
        )));
    }
    Ok((&input[start..end], &input[end..]))
}

fn decode_item(input: &[u8]) -> Result<(Rlp<'_>, &[u8]), ChainError> {
    let first = *input
        .first()
        .ok_or_else(|| ChainError::Decode("unexpected end of input".to_string()))?;

    match first {
        0x00..=0x7f => Ok((Rlp::Bytes(&input[..1]), &input[1..])),
        0x80..=0xb7 => {
            let (payload, rest) = take(input, 1, (first - 0x80) as usize)?;
            Ok((Rlp::Bytes(payload), rest))
        }
        0xb8..=0xbf => {
            let len_of_len = (first - 0xb7) as usize;
            let (len_bytes, _) = take(input, 1, len_of_len)?;
            let (payload, rest) = take(input, 1 + len_of_len, be_len(len_bytes)?)?;
            Ok((Rlp::Bytes(payload), rest))
        }
        0xc0..=0xf7 => {
            let (payload, rest) = take(input, 1, (first - 0xc0) as usize)?;
            Ok((Rlp::List(decode_list(payload)?), rest))
        }
        0xf8..=0xff => {
            let len_of_len = (first - 0xf7) as usize;
            let (len_bytes, _) = take(input, 1, len_of_len)?;
            let (payload, rest) = take(input, 1 + len_of_len, be_len(len_bytes)?)?;
            Ok((Rlp::List(decode_list(payload)?), rest))
        }
    }
}

fn decode_list(mut payload: &[u8]) -> Result<Vec<Rlp<'_>>, ChainError> {
    let mut items = Vec::new();
    while !payload.is_empty() {
        let (item, rest) = decode_item(payload)?;
        items.push(item);
        payload = rest;
    }
    Ok(items)
}

fn to_u64(bytes: &[u8], field: &str) -> Result<u64, ChainError> {
    if bytes.len() > 8 {
        return Err(ChainError::Decode(format!("field '{}' exceeds 64 bits", field)));
    }
    Ok(bytes.iter().fold(0u64, |acc, b| (acc << 8) | *b as u64))
}

/// JSON-RPC quantity encoding: no leading zeros, "0x0" for zero
fn to_quantity(bytes: &[u8]) -> String {
    let hex = to_hex(bytes);
    let digits = hex[2..].trim_start_matches('0');
    if digits.is_empty() {
        "0x0".to_string()
    } else {
        format!("0x{}", digits)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedTransaction {
    pub tx_type: u8,
    pub chain_id: Option<u64>,
    pub nonce: u64,
    pub gas_limit: u64,
    pub to: Option<String>,
    pub value: String,
    pub data: String,
}

impl DecodedTransaction {
    /// Call object for eth_estimateGas
    pub fn to_call_object(&self, from_address: &str) -> Value {
        let mut call = json!({
            "from": from_address,
            "value": self.value,
            "data": self.data,
        });
        if let Some(to) = &self.to {
            call["to"] = json!(to);
        }
        call
    }
}

/// Decode a signed transaction envelope
pub fn decode_transaction(raw: &[u8]) -> Result<DecodedTransaction, ChainError> {
    let first = *raw
        .first()
        .ok_or_else(|| ChainError::Decode("empty payload".to_string()))?;

    // Typed envelopes start with the type byte; legacy starts with a list header
    let (tx_type, body) = if first >= 0xc0 {
        (0u8, raw)
    } else if first == 0x01 || first == 0x02 {
        (first, &raw[1..])
    } else {
        return Err(ChainError::Decode(format!(
            "unsupported transaction type 0x{:02x}",
            first
        )));
    };

    let (item, rest) = decode_item(body)?;
    if !rest.is_empty() {
        return Err(ChainError::Decode("trailing bytes after transaction".to_string()));
    }
    let fields = match item {
        Rlp::List(fields) => fields,
        Rlp::Bytes(_) => return Err(ChainError::Decode("transaction is not a list".to_string())),
    };

    // Index of (nonce, gas_limit, to) and minimum field count per type
    let (chain_idx, nonce_idx, gas_idx, to_idx, min_fields) = match tx_type {
        0 => (None, 0, 2, 3, 9),
        1 => (Some(0), 1, 3, 4, 11),
        _ => (Some(0), 1, 4, 5, 12),
    };
    if fields.len() < min_fields {
        return Err(ChainError::Decode(format!(
            "type {} transaction has {} fields, expected {}",
            tx_type,
            fields.len(),
            min_fields
        )));
    }

    let chain_id = match chain_idx {
        Some(i) => Some(to_u64(fields[i].bytes("chain_id")?, "chain_id")?),
        None => None,
    };
    let to_bytes = fields[to_idx].bytes("to")?;
    let to = match to_bytes.len() {
        0 => None,
        20 => Some(to_hex(to_bytes)),
        n => {
            return Err(ChainError::Decode(format!("recipient has {} bytes", n)));
        }
    };

    Ok(DecodedTransaction {
        tx_type,
        chain_id,
        nonce: to_u64(fields[nonce_idx].bytes("nonce")?, "nonce")?,
        gas_limit: to_u64(fields[gas_idx].bytes("gas")?, "gas")?,
        to,
        value: to_quantity(fields[to_idx + 1].bytes("value")?),
        data: to_hex(fields[to_idx + 2].bytes("data")?),
    })
}
