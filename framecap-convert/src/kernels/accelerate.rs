//! vImage (Accelerate.framework) channel shuffles
//!
//! vImage covers plain permutes between 4-channel pixels and the add/drop of
//! a trailing alpha channel. Any other map is handed to the scalar kernel.

use super::scalar;
use crate::types::{ChannelMap, FILL_ALPHA};
use std::ffi::c_void;

#[repr(C)]
struct VImageBuffer {
    data: *mut c_void,
    height: usize,
    width: usize,
    row_bytes: usize,
}

type VImageError = isize;

const NO_FLAGS: u32 = 0;
const NO_ERROR: VImageError = 0;

#[link(name = "Accelerate", kind = "framework")]
extern "C" {
    fn vImagePermuteChannels_ARGB8888(
        src: *const VImageBuffer,
        dest: *const VImageBuffer,
        permute_map: *const u8,
        flags: u32,
    ) -> VImageError;

    fn vImageConvert_RGB888toRGBA8888(
        rgb_src: *const VImageBuffer,
        a_src: *const VImageBuffer,
        alpha: u8,
        rgba_dest: *const VImageBuffer,
        premultiply: bool,
        flags: u32,
    ) -> VImageError;

    fn vImageConvert_RGBA8888toRGB888(
        rgba_src: *const VImageBuffer,
        rgb_dest: *const VImageBuffer,
        flags: u32,
    ) -> VImageError;
}

fn row_buffer(data: *const u8, width: usize, channels: usize) -> VImageBuffer {
    VImageBuffer {
        data: data as *mut c_void,
        height: 1,
        width,
        row_bytes: width * channels,
    }
}

pub(crate) fn shuffle_row(src: &[u8], dst: &mut [u8], map: &ChannelMap, width: usize) {
    if width == 0 {
        return;
    }
    let indices = map.indices();
    let src_buf = row_buffer(src.as_ptr(), width, map.src_channels());
    let dst_buf = row_buffer(dst.as_mut_ptr(), width, map.dst_channels());

    let status = match (map.src_channels(), map.dst_channels()) {
        (4, 4) if !indices.contains(&FILL_ALPHA) => unsafe {
            vImagePermuteChannels_ARGB8888(&src_buf, &dst_buf, indices.as_ptr(), NO_FLAGS)
        },
        (3, 4) if indices == [0, 1, 2, FILL_ALPHA] => unsafe {
            vImageConvert_RGB888toRGBA8888(
                &src_buf,
                std::ptr::null(),
                0xff,
                &dst_buf,
                false,
                NO_FLAGS,
            )
        },
        (4, 3) if indices[..3] == [0, 1, 2] => unsafe {
            vImageConvert_RGBA8888toRGB888(&src_buf, &dst_buf, NO_FLAGS)
        },
        _ => {
            scalar::shuffle_row(src, dst, map, width);
            return;
        }
    };

    if status != NO_ERROR {
        log::warn!("vImage shuffle failed ({}), using scalar kernel", status);
        scalar::shuffle_row(src, dst, map, width);
    }
}
