//! Frame descriptors and image layouts

use super::{PixelFormat, Size};

/// Most planes any pixel format uses
pub const MAX_PLANES: usize = 8;

/// Fixed-capacity array with an explicit valid count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneArray<T> {
    items: [T; MAX_PLANES],
    len: usize,
}

impl<T: Copy + Default> PlaneArray<T> {
    pub fn new() -> Self {
        Self {
            items: [T::default(); MAX_PLANES],
            len: 0,
        }
    }

    /// Append a plane. Returns the item back when the array is full.
    pub fn push(&mut self, item: T) -> Result<(), T> {
        if self.len == MAX_PLANES {
            return Err(item);
        }
        self.items[self.len] = item;
        self.len += 1;
        Ok(())
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.as_slice().get(index)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items[..self.len]
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.as_slice().iter()
    }
}

impl<T: Copy + Default> Default for PlaneArray<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy + Default> FromIterator<T> for PlaneArray<T> {
    /// Collects at most `MAX_PLANES` items; the rest are dropped
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut array = Self::new();
        for item in iter.into_iter().take(MAX_PLANES) {
            let _ = array.push(item);
        }
        array
    }
}

/// One plane of a picture: its rows and the byte span of each row
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Plane<'a> {
    pub data: &'a [u8],
    pub stride: usize,
}

impl<'a> Plane<'a> {
    pub fn as_ptr(&self) -> *const u8 {
        self.data.as_ptr()
    }

    /// Number of complete rows held by this plane
    pub fn rows(&self) -> usize {
        if self.stride == 0 {
            0
        } else {
            self.data.len() / self.stride
        }
    }
}

/// View of a decoded picture. Borrows the buffer that produced it, so it is
/// invalidated by the next pull/convert on that owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameDescriptor<'a> {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub planes: PlaneArray<Plane<'a>>,
}

impl<'a> FrameDescriptor<'a> {
    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn plane(&self, index: usize) -> Option<&Plane<'a>> {
        self.planes.get(index)
    }
}

/// Position of one plane inside a contiguous image buffer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaneLayout {
    pub offset: usize,
    pub stride: usize,
    pub rows: usize,
}

/// Plane layout of one packed image (alignment 1), e.g. a converter's
/// destination buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageLayout {
    pub format: PixelFormat,
    pub size: Size,
    pub planes: PlaneArray<PlaneLayout>,
    /// Total bytes for one image
    pub buffer_size: usize,
}

/// (bytes per sample group, horizontal chroma shift, vertical chroma shift)
type PlaneShape = (usize, u32, u32);

fn plane_shapes(format: PixelFormat) -> Option<&'static [PlaneShape]> {
    let shapes: &'static [PlaneShape] = match format {
        PixelFormat::Yuv420p => &[(1, 0, 0), (1, 1, 1), (1, 1, 1)],
        PixelFormat::Yuv422p => &[(1, 0, 0), (1, 1, 0), (1, 1, 0)],
        PixelFormat::Yuv444p => &[(1, 0, 0), (1, 0, 0), (1, 0, 0)],
        PixelFormat::Nv12 | PixelFormat::Nv21 => &[(1, 0, 0), (2, 1, 1)],
        PixelFormat::P010le => &[(2, 0, 0), (4, 1, 1)],
        PixelFormat::Gray8 => &[(1, 0, 0)],
        PixelFormat::Rgb24 | PixelFormat::Bgr24 => &[(3, 0, 0)],
        PixelFormat::Rgba | PixelFormat::Bgra | PixelFormat::Argb | PixelFormat::Abgr => {
            &[(4, 0, 0)]
        }
        _ => return None,
    };
    Some(shapes)
}

/// Round up a dimension shifted right by `shift` (chroma subsampling)
fn shifted_ceil(value: u32, shift: u32) -> usize {
    (((value as u64) + (1u64 << shift) - 1) >> shift) as usize
}

impl ImageLayout {
    /// Table-driven layout for `format` at `size`. Returns `None` for
    /// hardware or unnamed formats and for empty dimensions; engines with a
    /// native image routine cover the rest through `Engine::image_layout`.
    pub fn new(format: PixelFormat, size: Size) -> Option<Self> {
        if size.width == 0 || size.height == 0 {
            return None;
        }
        let shapes = plane_shapes(format)?;

        let mut planes = PlaneArray::new();
        let mut offset = 0usize;
        for &(step, x_shift, y_shift) in shapes {
            let stride = shifted_ceil(size.width, x_shift) * step;
            let rows = shifted_ceil(size.height, y_shift);
            planes
                .push(PlaneLayout { offset, stride, rows })
                .ok()?;
            offset += stride * rows;
        }

        Some(Self {
            format,
            size,
            planes,
            buffer_size: offset,
        })
    }

    /// Split `buffer` into plane views following this layout
    pub fn describe<'a>(&self, buffer: &'a [u8]) -> FrameDescriptor<'a> {
        let planes = self
            .planes
            .iter()
            .map(|p| Plane {
                data: buffer
                    .get(p.offset..p.offset + p.stride * p.rows)
                    .unwrap_or(&[]),
                stride: p.stride,
            })
            .collect();

        FrameDescriptor {
            width: self.size.width,
            height: self.size.height,
            format: self.format,
            planes,
        }
    }
}
