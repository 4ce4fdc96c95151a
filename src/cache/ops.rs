//! Pixel transfer between buffers and images. These are the black-box steps of the engine: copy,
//! component/depth conversion and box downscaling.

use crate::cache::image::{Image, PlaneBuffer, pixel_offset};
use crate::foundation::core::{BitDepth, ImageComponents, MipLevel};
use crate::foundation::math::RectI;

/// Per destination channel, where to read it from in the source layout.
#[derive(Clone, Copy, Debug)]
enum ChannelSource {
    Src(usize),
    Const(f32),
}

fn channel_map(src: &ImageComponents, dst: &ImageComponents) -> Vec<ChannelSource> {
    dst.channels
        .iter()
        .map(|name| match src.channel_index(name) {
            Some(i) => ChannelSource::Src(i),
            None if name == "A" => ChannelSource::Const(1.0),
            None => ChannelSource::Const(0.0),
        })
        .collect()
}

fn convert_into(map: &[ChannelSource], depth: BitDepth, src: &[f32], dst: &mut [f32]) {
    for (d, m) in dst.iter_mut().zip(map) {
        let v = match *m {
            ChannelSource::Src(i) => src[i],
            ChannelSource::Const(c) => c,
        };
        *d = depth.quantize(v);
    }
}

impl Image {
    /// Copy `rect` of a render buffer into this image, converting layout and depth.
    pub(crate) fn paste_buffer(&self, buf: &PlaneBuffer, rect: RectI) {
        let Some(r) = rect
            .intersect(buf.bounds())
            .and_then(|r| r.intersect(self.bounds()))
        else {
            return;
        };
        let map = channel_map(buf.components(), self.components());
        let src_n = buf.components().n_comps();
        let dst_n = self.components().n_comps();
        let depth = self.depth();
        let bounds = self.bounds();
        let mut dst = self.pixels_write();
        for y in r.y1..r.y2 {
            for x in r.x1..r.x2 {
                let si = pixel_offset(buf.bounds(), src_n, x, y);
                let di = pixel_offset(bounds, dst_n, x, y);
                convert_into(
                    &map,
                    depth,
                    &buf.data()[si..si + src_n],
                    &mut dst[di..di + dst_n],
                );
            }
        }
    }

    /// Copy `rect` from another image at the same mip level, converting layout and depth.
    pub(crate) fn copy_region_from(&self, src: &Image, rect: RectI) {
        let Some(r) = rect
            .intersect(src.bounds())
            .and_then(|r| r.intersect(self.bounds()))
        else {
            return;
        };
        let map = channel_map(src.components(), self.components());
        let src_n = src.components().n_comps();
        let dst_n = self.components().n_comps();
        let depth = self.depth();
        let src_px = src.pixels_read();
        let mut dst = self.pixels_write();
        for y in r.y1..r.y2 {
            for x in r.x1..r.x2 {
                let si = pixel_offset(src.bounds(), src_n, x, y);
                let di = pixel_offset(self.bounds(), dst_n, x, y);
                convert_into(&map, depth, &src_px[si..si + src_n], &mut dst[di..di + dst_n]);
            }
        }
    }

    /// Box-filter `src` down into `dst_rect` of this image.
    ///
    /// `src` must be at a finer mip level. Source samples outside its bounds are skipped.
    pub(crate) fn downscale_from(&self, src: &Image, dst_rect: RectI) {
        let levels = self.mip().0.saturating_sub(src.mip().0);
        let Some(r) = dst_rect.intersect(self.bounds()) else {
            return;
        };
        let k = MipLevel(levels).alignment();
        let map = channel_map(src.components(), self.components());
        let src_n = src.components().n_comps();
        let dst_n = self.components().n_comps();
        let depth = self.depth();
        let src_bounds = src.bounds();
        let src_px = src.pixels_read();
        let mut dst = self.pixels_write();
        let mut acc = vec![0.0f32; src_n];
        for y in r.y1..r.y2 {
            for x in r.x1..r.x2 {
                acc.iter_mut().for_each(|a| *a = 0.0);
                let mut count = 0u32;
                for sy in y * k..(y + 1) * k {
                    for sx in x * k..(x + 1) * k {
                        if !src_bounds.contains_point(sx, sy) {
                            continue;
                        }
                        let si = pixel_offset(src_bounds, src_n, sx, sy);
                        for (a, v) in acc.iter_mut().zip(&src_px[si..si + src_n]) {
                            *a += *v;
                        }
                        count += 1;
                    }
                }
                if count > 0 {
                    let inv = 1.0 / count as f32;
                    acc.iter_mut().for_each(|a| *a *= inv);
                }
                let di = pixel_offset(self.bounds(), dst_n, x, y);
                convert_into(&map, depth, &acc, &mut dst[di..di + dst_n]);
            }
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/cache/ops.rs"]
mod tests;
