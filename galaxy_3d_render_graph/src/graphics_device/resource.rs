/// GPU resource trait, resource descriptor and resource states

use std::fmt::Debug;
use bitflags::bitflags;

/// Resource and view format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[allow(non_camel_case_types)]
pub enum Format {
    /// Untyped (buffers) or "inherit the resource format" (views)
    UNKNOWN,

    // Color formats
    R8G8B8A8_UNORM,
    R8G8B8A8_SRGB,
    B8G8R8A8_UNORM,
    B8G8R8A8_SRGB,
    R16G16B16A16_FLOAT,
    R32G32B32A32_FLOAT,
    R11G11B10_FLOAT,
    R16_FLOAT,
    R32_FLOAT,
    R32_UINT,

    // Depth formats
    D16_UNORM,
    D32_FLOAT,
    D24_UNORM_S8_UINT,
    D32_FLOAT_S8X24_UINT,
}

impl Format {
    /// Whether the format can back a depth-stencil view
    pub fn is_depth(&self) -> bool {
        matches!(
            self,
            Format::D16_UNORM | Format::D32_FLOAT | Format::D24_UNORM_S8_UINT | Format::D32_FLOAT_S8X24_UINT
        )
    }

    /// Number of planes (depth + stencil formats have two)
    pub fn plane_count(&self) -> u32 {
        match self {
            Format::D24_UNORM_S8_UINT | Format::D32_FLOAT_S8X24_UINT => 2,
            _ => 1,
        }
    }
}

/// Resource dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceDimension {
    Buffer,
    Texture1D,
    Texture2D,
    Texture3D,
}

/// Native resource descriptor
///
/// Mirrors the layout part of `D3D12_RESOURCE_DESC`: a buffer is `width`
/// bytes with a single subresource, a texture has
/// `mip_levels * array_size * plane_count` subresources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceDesc {
    /// Buffer or texture dimension
    pub dimension: ResourceDimension,
    /// Width in texels, or size in bytes for buffers
    pub width: u64,
    /// Height in texels (1 for buffers and 1D textures)
    pub height: u32,
    /// Depth for 3D textures, array size otherwise
    pub depth_or_array_size: u32,
    /// Number of mip levels
    pub mip_levels: u32,
    /// Texel format (UNKNOWN for buffers)
    pub format: Format,
}

impl ResourceDesc {
    /// Describe a buffer of `size` bytes
    pub fn buffer(size: u64) -> Self {
        Self {
            dimension: ResourceDimension::Buffer,
            width: size,
            height: 1,
            depth_or_array_size: 1,
            mip_levels: 1,
            format: Format::UNKNOWN,
        }
    }

    /// Describe a 1D texture with a single mip
    pub fn texture_1d(width: u32, format: Format) -> Self {
        Self {
            dimension: ResourceDimension::Texture1D,
            width: width as u64,
            height: 1,
            depth_or_array_size: 1,
            mip_levels: 1,
            format,
        }
    }

    /// Describe a 2D texture with a single mip and a single slice
    pub fn texture_2d(width: u32, height: u32, format: Format) -> Self {
        Self {
            dimension: ResourceDimension::Texture2D,
            width: width as u64,
            height,
            depth_or_array_size: 1,
            mip_levels: 1,
            format,
        }
    }

    /// Describe a 3D texture with a single mip
    pub fn texture_3d(width: u32, height: u32, depth: u32, format: Format) -> Self {
        Self {
            dimension: ResourceDimension::Texture3D,
            width: width as u64,
            height,
            depth_or_array_size: depth,
            mip_levels: 1,
            format,
        }
    }

    /// Set the mip count
    pub fn with_mip_levels(mut self, mip_levels: u32) -> Self {
        self.mip_levels = mip_levels;
        self
    }

    /// Set the array size (ignored by 3D textures, whose slices are depth)
    pub fn with_array_size(mut self, array_size: u32) -> Self {
        if self.dimension != ResourceDimension::Texture3D {
            self.depth_or_array_size = array_size;
        }
        self
    }

    /// Number of array slices addressed by subresource indices
    pub fn array_size(&self) -> u32 {
        match self.dimension {
            ResourceDimension::Buffer | ResourceDimension::Texture3D => 1,
            _ => self.depth_or_array_size,
        }
    }

    /// Depth in slices (1 unless 3D)
    pub fn depth(&self) -> u32 {
        match self.dimension {
            ResourceDimension::Texture3D => self.depth_or_array_size,
            _ => 1,
        }
    }

    /// Number of mips addressed by subresource indices
    pub fn mip_count(&self) -> u32 {
        match self.dimension {
            ResourceDimension::Buffer => 1,
            _ => self.mip_levels,
        }
    }

    /// Number of planes
    pub fn plane_count(&self) -> u32 {
        match self.dimension {
            ResourceDimension::Buffer => 1,
            _ => self.format.plane_count(),
        }
    }

    /// Total number of physical subresources
    pub fn subresource_count(&self) -> u32 {
        self.mip_count() * self.array_size() * self.plane_count()
    }

    /// Flat subresource index (`mip + slice * mips + plane * mips * slices`)
    pub fn subresource_index(&self, mip: u32, array_slice: u32, plane: u32) -> u32 {
        mip + array_slice * self.mip_count() + plane * self.mip_count() * self.array_size()
    }
}

/// Subresource selector
///
/// `All` addresses every physical subresource at once
/// (`D3D12_RESOURCE_BARRIER_ALL_SUBRESOURCES`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Subresource {
    All,
    Index(u32),
}

bitflags! {
    /// Resource usage states (`D3D12_RESOURCE_STATES`)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct ResourceStates: u32 {
        const COMMON = 0;
        const VERTEX_AND_CONSTANT_BUFFER = 0x1;
        const INDEX_BUFFER = 0x2;
        const RENDER_TARGET = 0x4;
        const UNORDERED_ACCESS = 0x8;
        const DEPTH_WRITE = 0x10;
        const DEPTH_READ = 0x20;
        const NON_PIXEL_SHADER_RESOURCE = 0x40;
        const PIXEL_SHADER_RESOURCE = 0x80;
        const STREAM_OUT = 0x100;
        const INDIRECT_ARGUMENT = 0x200;
        const COPY_DEST = 0x400;
        const COPY_SOURCE = 0x800;
        const RESOLVE_DEST = 0x1000;
        const RESOLVE_SOURCE = 0x2000;

        const ALL_SHADER_RESOURCE = Self::NON_PIXEL_SHADER_RESOURCE.bits() | Self::PIXEL_SHADER_RESOURCE.bits();
        const GENERIC_READ = Self::VERTEX_AND_CONSTANT_BUFFER.bits()
            | Self::INDEX_BUFFER.bits()
            | Self::NON_PIXEL_SHADER_RESOURCE.bits()
            | Self::PIXEL_SHADER_RESOURCE.bits()
            | Self::INDIRECT_ARGUMENT.bits()
            | Self::COPY_SOURCE.bits();
    }
}

impl ResourceStates {
    /// Presentation state of swapchain buffers (same bits as COMMON)
    pub const PRESENT: Self = Self::COMMON;

    /// States that allow the GPU to write the resource
    pub const WRITE_STATES: Self = Self::from_bits_retain(
        Self::RENDER_TARGET.bits()
            | Self::UNORDERED_ACCESS.bits()
            | Self::DEPTH_WRITE.bits()
            | Self::STREAM_OUT.bits()
            | Self::COPY_DEST.bits()
            | Self::RESOLVE_DEST.bits(),
    );

    /// Whether any write state is set
    pub fn is_write(self) -> bool {
        self.intersects(Self::WRITE_STATES)
    }

    /// Whether a write state is combined with any other state
    ///
    /// D3D12 only allows read states to be OR-ed together.
    pub fn is_invalid_combination(self) -> bool {
        self.is_write() && (self.bits().count_ones() > 1)
    }
}

/// Native GPU resource (buffer or texture)
pub trait GpuResource: Send + Sync + Debug {
    /// Layout descriptor of the resource
    fn desc(&self) -> &ResourceDesc;

    /// Debug name
    fn name(&self) -> &str;
}

#[cfg(test)]
#[path = "resource_tests.rs"]
mod tests;
