/// Resource views (SRV / UAV / RTV / DSV) and their subresource coverage

use crate::error::{Error, Result};
use super::{DescriptorHeapKind, Format, ResourceDesc, ResourceDimension, ResourceStates, Subresource};

/// Count meaning "every remaining mip / slice" (D3D12's `-1`)
pub const REMAINING: u32 = u32::MAX;

/// Mip / slice / plane window of a texture view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureRange {
    pub first_mip: u32,
    pub mip_count: u32,
    /// Array slices (1D/2D) or depth slices (3D)
    pub first_slice: u32,
    pub slice_count: u32,
    pub plane_slice: u32,
}

impl TextureRange {
    /// Every mip and slice of plane 0
    pub const FULL: TextureRange = TextureRange {
        first_mip: 0,
        mip_count: REMAINING,
        first_slice: 0,
        slice_count: REMAINING,
        plane_slice: 0,
    };
}

/// Shape of a view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ViewDimension {
    Buffer {
        first_element: u64,
        num_elements: u32,
        /// 0 for typed / raw buffers (4-byte elements)
        structure_byte_stride: u32,
    },
    Texture1D(TextureRange),
    Texture2D(TextureRange),
    Texture3D(TextureRange),
}

/// Format + shape of a view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewDesc {
    /// `UNKNOWN` inherits the resource format
    pub format: Format,
    pub dimension: ViewDimension,
}

impl ViewDesc {
    /// Whole 2D texture (all mips, all slices, plane 0)
    pub fn texture_2d() -> Self {
        Self {
            format: Format::UNKNOWN,
            dimension: ViewDimension::Texture2D(TextureRange::FULL),
        }
    }

    /// Whole 1D texture
    pub fn texture_1d() -> Self {
        Self {
            format: Format::UNKNOWN,
            dimension: ViewDimension::Texture1D(TextureRange::FULL),
        }
    }

    /// Whole 3D texture
    pub fn texture_3d() -> Self {
        Self {
            format: Format::UNKNOWN,
            dimension: ViewDimension::Texture3D(TextureRange::FULL),
        }
    }

    /// Element window of a buffer
    pub fn buffer(first_element: u64, num_elements: u32, structure_byte_stride: u32) -> Self {
        Self {
            format: Format::UNKNOWN,
            dimension: ViewDimension::Buffer {
                first_element,
                num_elements,
                structure_byte_stride,
            },
        }
    }

    pub fn with_format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    /// Restrict to `count` mips starting at `first` (no-op on buffers)
    pub fn with_mips(mut self, first: u32, count: u32) -> Self {
        if let Some(range) = self.texture_range_mut() {
            range.first_mip = first;
            range.mip_count = count;
        }
        self
    }

    /// Restrict to `count` slices starting at `first` (no-op on buffers)
    pub fn with_slices(mut self, first: u32, count: u32) -> Self {
        if let Some(range) = self.texture_range_mut() {
            range.first_slice = first;
            range.slice_count = count;
        }
        self
    }

    /// Select a plane (no-op on buffers)
    pub fn with_plane(mut self, plane: u32) -> Self {
        if let Some(range) = self.texture_range_mut() {
            range.plane_slice = plane;
        }
        self
    }

    fn texture_range_mut(&mut self) -> Option<&mut TextureRange> {
        match &mut self.dimension {
            ViewDimension::Buffer { .. } => None,
            ViewDimension::Texture1D(range)
            | ViewDimension::Texture2D(range)
            | ViewDimension::Texture3D(range) => Some(range),
        }
    }
}

/// Depth-stencil view access
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DepthAccess {
    ReadWrite,
    ReadOnly,
}

/// How a pass looks at a resource
///
/// The derived order (tag first, then descriptor content) is the key used
/// to deduplicate descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceView {
    /// No descriptor (copies, indirect arguments, raw barriers)
    None,
    ShaderResource(ViewDesc),
    UnorderedAccess(ViewDesc),
    RenderTarget(ViewDesc),
    DepthStencil(ViewDesc, DepthAccess),
}

/// Resolved texture window, all counts explicit
struct ResolvedRange {
    first_mip: u32,
    mip_count: u32,
    first_slice: u32,
    slice_count: u32,
    first_plane: u32,
    plane_count: u32,
}

impl ResourceView {
    /// Short tag name used in logs and errors
    pub fn tag(&self) -> &'static str {
        match self {
            ResourceView::None => "NONE",
            ResourceView::ShaderResource(_) => "SRV",
            ResourceView::UnorderedAccess(_) => "UAV",
            ResourceView::RenderTarget(_) => "RTV",
            ResourceView::DepthStencil(..) => "DSV",
        }
    }

    /// Descriptor heap the view lives in (`None` for the NONE view)
    pub fn heap_kind(&self) -> Option<DescriptorHeapKind> {
        match self {
            ResourceView::None => None,
            ResourceView::ShaderResource(_) | ResourceView::UnorderedAccess(_) => {
                Some(DescriptorHeapKind::ShaderResource)
            }
            ResourceView::RenderTarget(_) => Some(DescriptorHeapKind::RenderTarget),
            ResourceView::DepthStencil(..) => Some(DescriptorHeapKind::DepthStencil),
        }
    }

    /// State a usage through this view requires when none is given explicitly
    pub fn default_state(&self) -> ResourceStates {
        match self {
            ResourceView::None => ResourceStates::COMMON,
            ResourceView::ShaderResource(_) => ResourceStates::ALL_SHADER_RESOURCE,
            ResourceView::UnorderedAccess(_) => ResourceStates::UNORDERED_ACCESS,
            ResourceView::RenderTarget(_) => ResourceStates::RENDER_TARGET,
            ResourceView::DepthStencil(_, DepthAccess::ReadWrite) => ResourceStates::DEPTH_WRITE,
            ResourceView::DepthStencil(_, DepthAccess::ReadOnly) => ResourceStates::DEPTH_READ,
        }
    }

    /// Subresources covered by the view on a resource described by `desc`
    ///
    /// Returns `[Subresource::All]` when the view covers the whole resource.
    ///
    /// # Errors
    ///
    /// `InvalidResource` when the view does not fit the resource: dimension
    /// mismatch, out of range mips / slices / planes / elements, multi-mip
    /// UAV / RTV / DSV, or a DSV on a non depth format.
    pub fn subresources(&self, desc: &ResourceDesc) -> Result<Vec<Subresource>> {
        let view = match self {
            ResourceView::None => return Ok(vec![Subresource::All]),
            ResourceView::ShaderResource(view)
            | ResourceView::UnorderedAccess(view)
            | ResourceView::RenderTarget(view)
            | ResourceView::DepthStencil(view, _) => view,
        };

        let range = match (&view.dimension, desc.dimension) {
            (
                ViewDimension::Buffer { first_element, num_elements, structure_byte_stride },
                ResourceDimension::Buffer,
            ) => {
                if matches!(self, ResourceView::RenderTarget(_) | ResourceView::DepthStencil(..)) {
                    return Err(invalid(format!("{} views cannot target buffers", self.tag())));
                }
                let stride = if *structure_byte_stride == 0 { 4 } else { *structure_byte_stride as u64 };
                let end = first_element
                    .checked_add(*num_elements as u64)
                    .and_then(|elements| elements.checked_mul(stride));
                if *num_elements == 0 || end.map_or(true, |end| end > desc.width) {
                    return Err(invalid(format!(
                        "buffer window [{}, +{}) x {} bytes exceeds {} bytes",
                        first_element, num_elements, stride, desc.width
                    )));
                }
                return Ok(vec![Subresource::All]);
            }
            (ViewDimension::Texture1D(range), ResourceDimension::Texture1D)
            | (ViewDimension::Texture2D(range), ResourceDimension::Texture2D)
            | (ViewDimension::Texture3D(range), ResourceDimension::Texture3D) => self.resolve(range, desc)?,
            (dimension, resource) => {
                return Err(invalid(format!(
                    "{} dimension {:?} does not match resource dimension {:?}",
                    self.tag(), dimension, resource
                )));
            }
        };

        let covers_all = range.mip_count == desc.mip_count()
            && range.plane_count == desc.plane_count()
            && (desc.dimension == ResourceDimension::Texture3D || range.slice_count == desc.array_size());
        if covers_all {
            return Ok(vec![Subresource::All]);
        }

        // 3D slices are depth slices, not subresources
        let (first_slice, slice_count) = if desc.dimension == ResourceDimension::Texture3D {
            (0, 1)
        } else {
            (range.first_slice, range.slice_count)
        };

        let mut subresources = Vec::with_capacity((range.mip_count * slice_count * range.plane_count) as usize);
        for plane in range.first_plane..range.first_plane + range.plane_count {
            for slice in first_slice..first_slice + slice_count {
                for mip in range.first_mip..range.first_mip + range.mip_count {
                    subresources.push(Subresource::Index(desc.subresource_index(mip, slice, plane)));
                }
            }
        }
        Ok(subresources)
    }

    fn resolve(&self, range: &TextureRange, desc: &ResourceDesc) -> Result<ResolvedRange> {
        let mips = desc.mip_count();
        let slices = match desc.dimension {
            ResourceDimension::Texture3D => desc.depth(),
            _ => desc.array_size(),
        };

        if range.first_mip >= mips {
            return Err(invalid(format!("first mip {} out of {} mips", range.first_mip, mips)));
        }
        let mip_count = if range.mip_count == REMAINING { mips - range.first_mip } else { range.mip_count };
        if mip_count == 0 || range.first_mip.checked_add(mip_count).map_or(true, |end| end > mips) {
            return Err(invalid(format!(
                "mips [{}, +{}) out of {} mips", range.first_mip, mip_count, mips
            )));
        }

        if range.first_slice >= slices {
            return Err(invalid(format!("first slice {} out of {} slices", range.first_slice, slices)));
        }
        let slice_count = if range.slice_count == REMAINING { slices - range.first_slice } else { range.slice_count };
        if slice_count == 0 || range.first_slice.checked_add(slice_count).map_or(true, |end| end > slices) {
            return Err(invalid(format!(
                "slices [{}, +{}) out of {} slices", range.first_slice, slice_count, slices
            )));
        }

        let planes = desc.plane_count();
        if range.plane_slice >= planes {
            return Err(invalid(format!("plane {} out of {} planes", range.plane_slice, planes)));
        }

        let (first_plane, plane_count) = match self {
            ResourceView::DepthStencil(view, _) => {
                let format = if view.format == Format::UNKNOWN { desc.format } else { view.format };
                if !format.is_depth() {
                    return Err(invalid(format!("DSV requires a depth format, got {:?}", format)));
                }
                if desc.dimension == ResourceDimension::Texture3D {
                    return Err(invalid("DSV cannot target 3D textures".to_string()));
                }
                (0, planes)
            }
            _ => (range.plane_slice, 1),
        };

        if !matches!(self, ResourceView::ShaderResource(_)) && mip_count != 1 {
            return Err(invalid(format!("{} views address a single mip, got {}", self.tag(), mip_count)));
        }

        Ok(ResolvedRange {
            first_mip: range.first_mip,
            mip_count,
            first_slice: range.first_slice,
            slice_count,
            first_plane,
            plane_count,
        })
    }
}

fn invalid(message: String) -> Error {
    Error::InvalidResource(message)
}

#[cfg(test)]
#[path = "view_tests.rs"]
mod tests;
