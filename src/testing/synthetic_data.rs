//! Synthetic image content shaped like PS3 Eye output
//!
//! Color modes arrive as padded BGRA (alpha always 255), mono and Bayer modes
//! as one byte per pixel.

/// Fill a raw capture buffer with a gradient that shifts every frame.
///
/// The channel count is derived from the buffer length, so the same call
/// works for BGRA and single-channel buffers.
pub fn fill_test_pattern(buffer: &mut [u8], width: u32, height: u32, frame_number: u64) {
    let pixels = width as usize * height as usize;
    if pixels == 0 {
        return;
    }
    let channels = (buffer.len() / pixels).max(1);
    let base = (frame_number % 256) as u8;

    for (index, pixel) in buffer.chunks_exact_mut(channels).enumerate() {
        let x = (index % width as usize) as u8;
        let y = (index / width as usize) as u8;
        match pixel {
            [b, g, r, a] => {
                *b = base.wrapping_add(x);
                *g = base.wrapping_add(y);
                *r = base.wrapping_add(x.wrapping_add(y));
                *a = 255;
            }
            _ => {
                for value in pixel.iter_mut() {
                    *value = base.wrapping_add(x);
                }
            }
        }
    }
}
