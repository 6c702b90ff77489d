//! Fan-out of encoded frames to any number of `/video_feed` consumers.
//!
//! The producer overwrites a single slot and never waits; a slow consumer
//! simply skips frames. Dropping the sender ends every stream.

use bytes::{BufMut, Bytes, BytesMut};
use tokio::sync::watch;

pub const BOUNDARY: &str = "frame";
pub const STREAM_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

pub type FrameSender = watch::Sender<Option<Bytes>>;
pub type FrameReceiver = watch::Receiver<Option<Bytes>>;

pub fn frame_channel() -> (FrameSender, FrameReceiver) {
    watch::channel(None)
}

/// Frame one JPEG as a part of the `multipart/x-mixed-replace` stream.
pub fn multipart_part(jpeg: &[u8]) -> Bytes {
    const HEAD: &[u8] = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n";
    const TAIL: &[u8] = b"\r\n\r\n";

    let mut part = BytesMut::with_capacity(HEAD.len() + jpeg.len() + TAIL.len());
    part.put_slice(HEAD);
    part.put_slice(jpeg);
    part.put_slice(TAIL);
    part.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn part_layout() {
        let part = multipart_part(&[0xff, 0xd8, 0xff, 0xd9]);
        let mut expected = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n".to_vec();
        expected.extend_from_slice(&[0xff, 0xd8, 0xff, 0xd9]);
        expected.extend_from_slice(b"\r\n\r\n");
        assert_eq!(&part[..], &expected[..]);
    }

    #[test]
    fn boundary_matches_content_type() {
        assert!(STREAM_CONTENT_TYPE.ends_with(&format!("boundary={}", BOUNDARY)));
        assert!(multipart_part(b"x").starts_with(format!("--{}\r\n", BOUNDARY).as_bytes()));
    }

    #[test]
    fn late_receivers_see_latest_frame_only() {
        let (tx, _rx) = frame_channel();
        tx.send_replace(Some(multipart_part(b"one")));
        tx.send_replace(Some(multipart_part(b"two")));

        let late = tx.subscribe();
        assert_eq!(late.borrow().as_deref(), Some(&multipart_part(b"two")[..]));
    }
}
