//
// Copyright (c) The Edgectl Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use bytes::{Buf, BufMut, Bytes, BytesMut, TryGetError};
use edgectl_utils::MacAddr;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

/// Frame-level protocol state, one byte on the wire.
#[derive(Clone, Copy, Debug, Eq, FromPrimitive, PartialEq)]
pub enum FrameState {
    Hreq = 1,
    Hres = 2,
    Rreq = 3,
    Rres = 4,
    Rack = 5,
    Rcan = 6,
    Dreq = 7,
    Dres = 8,
    Dack = 9,
    Dcan = 10,
    Dwait = 11,
}

impl FrameState {
    fn has_cos_id(self) -> bool {
        matches!(self, FrameState::Hreq | FrameState::Rreq)
    }

    fn has_data(self) -> bool {
        matches!(self, FrameState::Dreq | FrameState::Dres)
    }

    fn has_src(self) -> bool {
        matches!(
            self,
            FrameState::Rreq
                | FrameState::Rres
                | FrameState::Rack
                | FrameState::Rcan
                | FrameState::Dack
                | FrameState::Dcan
        )
    }

    fn has_host(self) -> bool {
        matches!(self, FrameState::Hres | FrameState::Dack | FrameState::Dcan)
    }
}

impl std::fmt::Display for FrameState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FrameState::Hreq => "HREQ",
            FrameState::Hres => "HRES",
            FrameState::Rreq => "RREQ",
            FrameState::Rres => "RRES",
            FrameState::Rack => "RACK",
            FrameState::Rcan => "RCAN",
            FrameState::Dreq => "DREQ",
            FrameState::Dres => "DRES",
            FrameState::Dack => "DACK",
            FrameState::Dcan => "DCAN",
            FrameState::Dwait => "DWAIT",
        };
        write!(f, "{name}")
    }
}

/// A reply "answers" a prior frame iff the req_id matches and the
/// state pair is one of these.
pub fn answers(prior: FrameState, reply: FrameState) -> bool {
    matches!(
        (prior, reply),
        (FrameState::Hreq, FrameState::Hres)
            | (FrameState::Rreq, FrameState::Rres)
            | (FrameState::Rreq, FrameState::Rcan)
            | (FrameState::Rres, FrameState::Rack)
            | (FrameState::Rres, FrameState::Rcan)
            | (FrameState::Dreq, FrameState::Dres)
            | (FrameState::Dreq, FrameState::Dwait)
            | (FrameState::Dreq, FrameState::Dcan)
            | (FrameState::Dres, FrameState::Dack)
            | (FrameState::Dres, FrameState::Dcan)
    )
}

pub const MAC_LEN: usize = 6;
pub const IP_LEN: usize = 4;
pub const REQ_ID_LEN: usize = 16;

/// One host-request protocol frame, field set per [`FrameState`].
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    pub state: FrameState,
    pub req_id: String,
    pub attempt_no: u32,
    pub cos_id: Option<u32>,
    pub data: Option<Bytes>,
    pub src_mac: Option<MacAddr>,
    pub src_ip: Option<Ipv4Addr>,
    pub host_mac: Option<MacAddr>,
    pub host_ip: Option<Ipv4Addr>,
}

impl Frame {
    pub fn new(state: FrameState, req_id: impl Into<String>, attempt_no: u32) -> Self {
        Frame {
            state,
            req_id: req_id.into(),
            attempt_no,
            cos_id: None,
            data: None,
            src_mac: None,
            src_ip: None,
            host_mac: None,
            host_ip: None,
        }
    }

    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::new();
        buf.put_u8(self.state as u8);

        let mut req_id = self.req_id.clone().into_bytes();
        req_id.resize(REQ_ID_LEN, 0);
        buf.put_slice(&req_id);

        buf.put_u32(self.attempt_no);

        if self.state.has_cos_id() {
            buf.put_u32(self.cos_id.unwrap_or(0));
        }
        if self.state.has_data() {
            let data = self.data.clone().unwrap_or_default();
            buf.put_u32(data.len() as u32);
            buf.put_slice(&data);
        }
        if self.state.has_src() {
            put_mac(&mut buf, self.src_mac);
            put_ip(&mut buf, self.src_ip);
        }
        if self.state.has_host() {
            put_mac(&mut buf, self.host_mac);
            put_ip(&mut buf, self.host_ip);
        }
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        let mut buf = Bytes::copy_from_slice(data);

        if buf.remaining() < 1 + REQ_ID_LEN + 4 {
            return Err(DecodeError::IncompleteFrame);
        }

        let state_byte = buf.try_get_u8()?;
        let Some(state) = FrameState::from_u8(state_byte) else {
            return Err(DecodeError::InvalidState(state_byte));
        };

        let mut req_id_bytes = vec![0u8; REQ_ID_LEN];
        buf.copy_to_slice(&mut req_id_bytes);
        let req_id = String::from_utf8_lossy(&req_id_bytes)
            .trim_end_matches('\0')
            .to_string();
        if req_id.is_empty() {
            return Err(DecodeError::EmptyReqId);
        }

        let attempt_no = buf.try_get_u32()?;

        let mut frame = Frame::new(state, req_id, attempt_no);

        if state.has_cos_id() {
            frame.cos_id = Some(buf.try_get_u32()?);
        }
        if state.has_data() {
            let len = buf.try_get_u32()? as usize;
            if buf.remaining() < len {
                return Err(DecodeError::IncompleteFrame);
            }
            frame.data = Some(buf.copy_to_bytes(len));
        }
        if state.has_src() {
            frame.src_mac = Some(get_mac(&mut buf)?);
            frame.src_ip = Some(get_ip(&mut buf)?);
        }
        if state.has_host() {
            frame.host_mac = Some(get_mac(&mut buf)?);
            frame.host_ip = Some(get_ip(&mut buf)?);
        }

        Ok(frame)
    }
}

fn put_mac(buf: &mut BytesMut, mac: Option<MacAddr>) {
    buf.put_slice(mac.unwrap_or(MacAddr::ZERO).as_bytes());
}

fn put_ip(buf: &mut BytesMut, ip: Option<Ipv4Addr>) {
    buf.put_slice(&ip.unwrap_or(Ipv4Addr::UNSPECIFIED).octets());
}

fn get_mac(buf: &mut Bytes) -> Result<MacAddr, DecodeError> {
    if buf.remaining() < MAC_LEN {
        return Err(DecodeError::ReadOutOfBounds);
    }
    let mut octets = [0u8; MAC_LEN];
    buf.copy_to_slice(&mut octets);
    Ok(MacAddr::from(octets))
}

fn get_ip(buf: &mut Bytes) -> Result<Ipv4Addr, DecodeError> {
    if buf.remaining() < IP_LEN {
        return Err(DecodeError::ReadOutOfBounds);
    }
    let v = buf.get_u32();
    Ok(Ipv4Addr::from(v))
}

#[derive(Debug, Eq, PartialEq)]
pub enum DecodeError {
    IncompleteFrame,
    InvalidState(u8),
    EmptyReqId,
    ReadOutOfBounds,
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::IncompleteFrame => write!(f, "incomplete frame"),
            DecodeError::InvalidState(b) => write!(f, "invalid frame state byte: {b}"),
            DecodeError::EmptyReqId => write!(f, "empty req_id"),
            DecodeError::ReadOutOfBounds => write!(f, "attempt to read out of bounds"),
        }
    }
}

impl std::error::Error for DecodeError {}

impl From<TryGetError> for DecodeError {
    fn from(_error: TryGetError) -> DecodeError {
        DecodeError::ReadOutOfBounds
    }
}
