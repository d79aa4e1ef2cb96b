// SPDX-License-Identifier: AGPL-3.0-or-later

//! Length-prefixed framing (component C1).
//!
//! Wire layout: a 4-byte little-endian unsigned length `N`, inclusive of
//! itself, followed by `N - 4` payload bytes. Parsing is stateless and pure
//! — no I/O happens in this module, matching the original's `readBody`.

use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Frames larger than this are rejected as malformed (spec §3: "recommended
/// 16 MiB").
pub const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

#[derive(Debug, PartialEq, Eq)]
pub enum FrameState {
    /// A full frame was extracted; caller should re-invoke on the remainder.
    Full,
    /// Not enough bytes buffered yet; caller should read more from the
    /// socket.
    NeedMore,
    /// The declared length is invalid; the connection must be closed.
    Error,
}

/// Attempt to extract one full frame's payload from `buf`.
///
/// Returns `(payload, consumed, state)`. `payload` is only meaningful when
/// `state == Full`; `consumed` is the number of bytes of `buf` that made up
/// the frame (header + payload) and should be advanced past by the caller.
pub fn try_read_frame(buf: &[u8]) -> (Option<Bytes>, usize, FrameState) {
    if buf.len() <= 4 {
        return (None, 0, FrameState::NeedMore);
    }
    let n = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
    if n <= 4 || n > MAX_FRAME_LEN {
        return (None, 0, FrameState::Error);
    }
    let n = n as usize;
    if n <= buf.len() {
        let payload = Bytes::copy_from_slice(&buf[4..n]);
        (Some(payload), n, FrameState::Full)
    } else {
        (None, 0, FrameState::NeedMore)
    }
}

/// Prefix `payload` with its own length (including the 4-byte header).
pub fn write_frame(payload: &[u8]) -> BytesMut {
    let total = payload.len() + 4;
    let mut out = BytesMut::with_capacity(total);
    out.put_u32_le(total as u32);
    out.extend_from_slice(payload);
    out
}

/// Greedily drain every full frame currently buffered in `acc`, invoking
/// `on_frame` for each and leaving any trailing partial frame in place.
///
/// Returns `Err(())` if a framing error was encountered (connection must be
/// closed); on success, all complete frames have been consumed from `acc`.
pub fn drain_frames(acc: &mut BytesMut, mut on_frame: impl FnMut(Bytes)) -> Result<(), ()> {
    loop {
        let (payload, consumed, state) = try_read_frame(acc);
        match state {
            FrameState::Full => {
                if let Some(payload) = payload {
                    on_frame(payload);
                }
                acc.advance(consumed);
            }
            FrameState::NeedMore => return Ok(()),
            FrameState::Error => return Err(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_single_frame() {
        let payload = b"hello world";
        let framed = write_frame(payload);
        let (got, consumed, state) = try_read_frame(&framed);
        assert_eq!(state, FrameState::Full);
        assert_eq!(consumed, framed.len());
        assert_eq!(got.unwrap(), Bytes::from_static(payload));
    }

    #[test]
    fn need_more_on_partial_header() {
        let (_, _, state) = try_read_frame(&[1, 2]);
        assert_eq!(state, FrameState::NeedMore);
    }

    #[test]
    fn need_more_on_partial_body() {
        let framed = write_frame(b"abcdef");
        let (_, _, state) = try_read_frame(&framed[..framed.len() - 1]);
        assert_eq!(state, FrameState::NeedMore);
    }

    #[test]
    fn error_on_length_at_most_four() {
        let (_, _, state) = try_read_frame(&[4, 0, 0, 0, 0]);
        assert_eq!(state, FrameState::Error);
        let (_, _, state) = try_read_frame(&[0, 0, 0, 0, 0]);
        assert_eq!(state, FrameState::Error);
    }

    #[test]
    fn drain_frames_extracts_all_whole_frames_and_keeps_remainder() {
        let mut acc = BytesMut::new();
        acc.extend_from_slice(&write_frame(b"one"));
        acc.extend_from_slice(&write_frame(b"two"));
        acc.extend_from_slice(&[9, 9, 9]); // partial trailing frame

        let mut seen = Vec::new();
        drain_frames(&mut acc, |p| seen.push(p)).unwrap();

        assert_eq!(seen, vec![Bytes::from_static(b"one"), Bytes::from_static(b"two")]);
        assert_eq!(&acc[..], &[9, 9, 9]);
    }

    #[test]
    fn drain_frames_reports_error_on_bad_length() {
        let mut acc = BytesMut::from(&[1, 0, 0, 0, 0][..]);
        let res = drain_frames(&mut acc, |_| {});
        assert!(res.is_err());
    }
}
