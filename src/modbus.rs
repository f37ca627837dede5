use tokio_util::bytes::Buf;
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

#[derive(Debug, Clone, Copy)]
pub struct Request {
    pub device_id: u8,
    pub transaction_id: u16,
    pub operation: Operation,
}

#[derive(Debug, Clone, Copy)]
pub enum Operation {
    GetHoldings { address: u16, count: u16 },
    SetHolding { address: u16, value: u16 },
}

#[derive(Debug)]
pub struct Response {
    pub device_id: u8,
    pub transaction_id: u16,
    pub kind: ResponseKind,
}

impl Response {
    pub fn exception_code(&self) -> Option<u8> {
        match &self.kind {
            ResponseKind::ErrorCode(c) => Some(*c),
            ResponseKind::GetHoldings { values: _ } => None,
            ResponseKind::SetHolding { value: _ } => None,
        }
    }
}

#[derive(Debug)]
pub enum ResponseKind {
    ErrorCode(u8),
    GetHoldings { values: Vec<u8> },
    SetHolding { value: u16 },
}

pub trait Codec:
    for<'a> Encoder<&'a Request, Error = std::io::Error>
    + Decoder<Item = Response, Error = std::io::Error>
{
}

/// Modbus TCP (MBAP) framing.
#[derive(Default)]
pub struct ModbusTcpCodec {}

impl Encoder<&Request> for ModbusTcpCodec {
    type Error = std::io::Error;
    fn encode(
        &mut self,
        req: &Request,
        dst: &mut tokio_util::bytes::BytesMut,
    ) -> Result<(), Self::Error> {
        dst.extend(req.transaction_id.to_be_bytes());
        // Protocol identifier 0, then the length of what follows.
        dst.extend(&[0, 0, 0, 6]);
        match req.operation {
            Operation::GetHoldings { address, count } => {
                dst.extend(&[req.device_id, 3]);
                dst.extend(address.to_be_bytes());
                dst.extend(count.to_be_bytes());
            }
            Operation::SetHolding { address, value } => {
                dst.extend(&[req.device_id, 6]);
                dst.extend(address.to_be_bytes());
                dst.extend(value.to_be_bytes());
            }
        };
        trace!(message="sending encoded", buffer=?dst);
        Ok(())
    }
}

impl Decoder for ModbusTcpCodec {
    type Item = Response;
    type Error = std::io::Error;
    fn decode(
        &mut self,
        src: &mut tokio_util::bytes::BytesMut,
    ) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            trace!(message="attempt at decoding", buffer=?src);
            if src.len() < 8 {
                return Ok(None);
            }
            let Some((tr_id_buffer, remainder)) = src.split_first_chunk::<2>() else {
                return Ok(None);
            };
            let transaction_id = u16::from_be_bytes(*tr_id_buffer);
            let Some((proto_buffer, remainder)) = remainder.split_first_chunk::<2>() else {
                return Ok(None);
            };
            if u16::from_be_bytes(*proto_buffer) != 0 {
                src.advance(1);
                continue;
            }
            let Some((length_buffer, remainder)) = remainder.split_first_chunk::<2>() else {
                return Ok(None);
            };
            let required_length = u16::from_be_bytes(*length_buffer);
            let Some((data, _)) = remainder.split_at_checked(required_length.into()) else {
                return Ok(None);
            };
            let [device_id, function_code, code, ..] = data else {
                src.advance(1);
                continue;
            };
            let (device_id, function_code, code) = (*device_id, *function_code, *code);
            if function_code > 0x80 {
                src.advance(usize::from(required_length) + 6);
                return Ok(Some(Response {
                    transaction_id,
                    device_id,
                    kind: ResponseKind::ErrorCode(code),
                }));
            }
            let kind = match function_code {
                3 => {
                    // `code` is the payload byte count here; the TCP header
                    // length already bounds the payload, so trust the header.
                    let [_, _, _, values @ ..] = data else { unreachable!() };
                    ResponseKind::GetHoldings { values: values.to_vec() }
                }
                6 => {
                    let [_, _, _, _, a, b] = data else {
                        src.advance(1);
                        continue;
                    };
                    ResponseKind::SetHolding { value: u16::from_be_bytes([*a, *b]) }
                }
                _ => {
                    src.advance(1);
                    continue;
                }
            };
            src.advance(usize::from(required_length) + 6);
            return Ok(Some(Response { transaction_id, device_id, kind }));
        }
    }
}

impl Codec for ModbusTcpCodec {}

/// Modbus RTU framing carried over a TCP socket (RTU-over-TCP gateways.)
///
/// RTU frames carry no transaction identifier. The connection worker keeps at
/// most one request in flight, so the codec stamps decoded responses with the
/// identifier of the most recently encoded request.
#[derive(Default)]
pub struct ModbusRtuCodec {
    last_transaction_id: u16,
}

impl ModbusRtuCodec {
    pub fn new() -> Self {
        Self { last_transaction_id: 0 }
    }
}

impl Encoder<&Request> for ModbusRtuCodec {
    type Error = std::io::Error;
    fn encode(
        &mut self,
        req: &Request,
        dst: &mut tokio_util::bytes::BytesMut,
    ) -> Result<(), Self::Error> {
        self.last_transaction_id = req.transaction_id;
        let mut frame = [0u8; 6];
        frame[0] = req.device_id;
        match req.operation {
            Operation::GetHoldings { address, count } => {
                frame[1] = 3;
                frame[2..4].copy_from_slice(&address.to_be_bytes());
                frame[4..6].copy_from_slice(&count.to_be_bytes());
            }
            Operation::SetHolding { address, value } => {
                frame[1] = 6;
                frame[2..4].copy_from_slice(&address.to_be_bytes());
                frame[4..6].copy_from_slice(&value.to_be_bytes());
            }
        }
        dst.extend(frame);
        dst.extend(crc16(&frame).to_le_bytes());
        trace!(message="sending encoded", buffer=?dst);
        Ok(())
    }
}

impl Decoder for ModbusRtuCodec {
    type Item = Response;
    type Error = std::io::Error;
    fn decode(
        &mut self,
        src: &mut tokio_util::bytes::BytesMut,
    ) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < 5 {
            return Ok(None);
        }
        let device_id = src[0];
        let function_code = src[1];
        let frame_length = if function_code > 0x80 {
            5
        } else {
            match function_code {
                3 => 3 + usize::from(src[2]) + 2,
                6 => 8,
                _ => {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        format!("unexpected RTU function code {function_code}"),
                    ));
                }
            }
        };
        let Some((frame, _)) = src.split_at_checked(frame_length) else {
            return Ok(None);
        };
        let (payload, crc_bytes) = frame.split_at(frame_length - 2);
        let received_crc = u16::from_le_bytes([crc_bytes[0], crc_bytes[1]]);
        if crc16(payload) != received_crc {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "RTU frame failed the CRC check",
            ));
        }
        let kind = if function_code > 0x80 {
            ResponseKind::ErrorCode(payload[2])
        } else if function_code == 3 {
            ResponseKind::GetHoldings { values: payload[3..].to_vec() }
        } else {
            ResponseKind::SetHolding { value: u16::from_be_bytes([payload[4], payload[5]]) }
        };
        src.advance(frame_length);
        Ok(Some(Response { device_id, transaction_id: self.last_transaction_id, kind }))
    }
}

impl Codec for ModbusRtuCodec {}

/// CRC-16/MODBUS over the frame payload.
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        crc ^= u16::from(byte);
        for _ in 0..8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ 0xA001;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::bytes::BytesMut;

    #[test]
    fn crc16_matches_the_reference_check_value() {
        assert_eq!(crc16(b"123456789"), 0x4B37);
    }

    #[test]
    fn tcp_round_trip() {
        let mut codec = ModbusTcpCodec {};
        let mut buffer = BytesMut::new();
        let request = Request {
            device_id: 100,
            transaction_id: 7,
            operation: Operation::GetHoldings { address: 0x0005, count: 1 },
        };
        codec.encode(&request, &mut buffer).unwrap();
        assert_eq!(&buffer[..], &[0, 7, 0, 0, 0, 6, 100, 3, 0, 5, 0, 1]);

        let mut response = BytesMut::new();
        response.extend([0, 7, 0, 0, 0, 5, 100, 3, 2, 0, 1]);
        let decoded = codec.decode(&mut response).unwrap().unwrap();
        assert_eq!(decoded.transaction_id, 7);
        assert_eq!(decoded.device_id, 100);
        match decoded.kind {
            ResponseKind::GetHoldings { values } => assert_eq!(values, vec![0, 1]),
            other => panic!("unexpected response {other:?}"),
        }
        assert!(response.is_empty());
    }

    #[test]
    fn tcp_decodes_exceptions_and_partial_input() {
        let mut codec = ModbusTcpCodec {};
        let mut partial = BytesMut::new();
        partial.extend([0, 1, 0, 0]);
        assert!(codec.decode(&mut partial).unwrap().is_none());

        let mut exception = BytesMut::new();
        exception.extend([0, 9, 0, 0, 0, 3, 100, 0x83, 2]);
        let decoded = codec.decode(&mut exception).unwrap().unwrap();
        assert_eq!(decoded.exception_code(), Some(2));
    }

    #[test]
    fn rtu_round_trip() {
        let mut codec = ModbusRtuCodec::new();
        let mut buffer = BytesMut::new();
        let request = Request {
            device_id: 100,
            transaction_id: 42,
            operation: Operation::SetHolding { address: 0x0005, value: 1 },
        };
        codec.encode(&request, &mut buffer).unwrap();
        assert_eq!(&buffer[..6], &[100, 6, 0, 5, 0, 1]);
        let expected_crc = crc16(&buffer[..6]).to_le_bytes();
        assert_eq!(&buffer[6..], &expected_crc);

        // The echo response reuses the identical frame layout.
        let mut response = BytesMut::new();
        response.extend([100, 6, 0, 5, 0, 1]);
        let crc = crc16(&response[..]).to_le_bytes();
        response.extend(crc);
        let decoded = codec.decode(&mut response).unwrap().unwrap();
        assert_eq!(decoded.transaction_id, 42);
        match decoded.kind {
            ResponseKind::SetHolding { value } => assert_eq!(value, 1),
            other => panic!("unexpected response {other:?}"),
        }
    }

    #[test]
    fn rtu_rejects_bad_crc() {
        let mut codec = ModbusRtuCodec::new();
        let mut response = BytesMut::new();
        response.extend([100, 6, 0, 5, 0, 1, 0xAA, 0xBB]);
        assert!(codec.decode(&mut response).is_err());
    }
}
