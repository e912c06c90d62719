// SPDX-License-Identifier: CEPL-1.0
//! Pure negotiation policies. None of these touch a backend.

use ash::vk;

use crate::config::PresentPreference;
use crate::error::{RenderError, RenderResult};
use crate::RenderSize;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilyIndices {
    pub fn is_shared(&self) -> bool {
        self.graphics == self.present
    }

    /// Families in request order without duplicates.
    pub fn distinct(&self) -> Vec<u32> {
        if self.is_shared() {
            vec![self.graphics]
        } else {
            vec![self.graphics, self.present]
        }
    }
}

const IDEAL_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_UNORM,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// A lone `UNDEFINED` entry means the surface accepts anything, so take the ideal pair.
pub fn choose_surface_format(
    formats: &[vk::SurfaceFormatKHR],
) -> RenderResult<vk::SurfaceFormatKHR> {
    match formats {
        [] => Err(RenderError::InvalidState(
            "surface reports no formats".into(),
        )),
        [only] if only.format == vk::Format::UNDEFINED => Ok(IDEAL_FORMAT),
        _ => Ok(formats
            .iter()
            .copied()
            .find(|f| f.format == IDEAL_FORMAT.format && f.color_space == IDEAL_FORMAT.color_space)
            .unwrap_or(formats[0])),
    }
}

pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, requested: RenderSize) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        return caps.current_extent;
    }
    vk::Extent2D {
        width: requested
            .width
            .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
        height: requested
            .height
            .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
    }
}

pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let wanted = caps.min_image_count + 1;
    if caps.max_image_count != 0 {
        wanted.min(caps.max_image_count)
    } else {
        wanted
    }
}

pub fn choose_present_mode(
    modes: &[vk::PresentModeKHR],
    preference: PresentPreference,
) -> vk::PresentModeKHR {
    match preference {
        PresentPreference::Mailbox if modes.contains(&vk::PresentModeKHR::MAILBOX) => {
            vk::PresentModeKHR::MAILBOX
        }
        _ => vk::PresentModeKHR::FIFO,
    }
}

/// First memory type allowed by `type_bits` whose flags cover `required`.
pub fn find_memory_type(
    props: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    required: vk::MemoryPropertyFlags,
) -> RenderResult<u32> {
    let count = props.memory_type_count.min(vk::MAX_MEMORY_TYPES as u32);
    (0..count)
        .find(|&i| {
            type_bits & (1 << i) != 0
                && props.memory_types[i as usize]
                    .property_flags
                    .contains(required)
        })
        .ok_or(RenderError::NoMemoryType {
            type_bits,
            required,
        })
}

pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

pub fn has_stencil(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D32_SFLOAT_S8_UINT | vk::Format::D24_UNORM_S8_UINT
    )
}

pub fn depth_aspect(format: vk::Format) -> vk::ImageAspectFlags {
    if has_stencil(format) {
        vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
    } else {
        vk::ImageAspectFlags::DEPTH
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn fmt(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space,
        }
    }

    #[test]
    fn undefined_surface_format_means_free_choice() {
        let chosen =
            choose_surface_format(&[fmt(vk::Format::UNDEFINED, vk::ColorSpaceKHR::SRGB_NONLINEAR)])
                .unwrap();
        assert_eq!(chosen.format, vk::Format::B8G8R8A8_UNORM);
        assert_eq!(chosen.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);
    }

    #[test]
    fn ideal_pair_wins_over_position() {
        let formats = [
            fmt(vk::Format::R8G8B8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            fmt(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        let chosen = choose_surface_format(&formats).unwrap();
        assert_eq!(chosen.format, vk::Format::B8G8R8A8_UNORM);
    }

    #[test]
    fn first_format_is_the_fallback() {
        let formats = [
            fmt(vk::Format::R8G8B8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            fmt(vk::Format::R16G16B16A16_SFLOAT, vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT),
        ];
        let chosen = choose_surface_format(&formats).unwrap();
        assert_eq!(chosen.format, vk::Format::R8G8B8A8_SRGB);
        // Right format in the wrong color space is not the ideal pair.
        let formats = [
            fmt(vk::Format::R8G8B8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            fmt(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::DISPLAY_P3_NONLINEAR_EXT),
        ];
        let chosen = choose_surface_format(&formats).unwrap();
        assert_eq!(chosen.format, vk::Format::R8G8B8A8_SRGB);
        assert!(choose_surface_format(&[]).is_err());
    }

    fn free_extent_caps() -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 200,
                height: 150,
            },
            max_image_extent: vk::Extent2D {
                width: 1920,
                height: 1080,
            },
            ..Default::default()
        }
    }

    #[rstest]
    #[case(4000, 4000, 1920, 1080)]
    #[case(10, 10, 200, 150)]
    #[case(640, 480, 640, 480)]
    #[case(100, 2000, 200, 1080)]
    fn requested_extent_is_clamped(
        #[case] w: u32,
        #[case] h: u32,
        #[case] want_w: u32,
        #[case] want_h: u32,
    ) {
        let extent = choose_extent(&free_extent_caps(), RenderSize { width: w, height: h });
        assert_eq!((extent.width, extent.height), (want_w, want_h));
    }

    #[test]
    fn fixed_current_extent_is_used_verbatim() {
        let caps = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 800,
                height: 600,
            },
            ..free_extent_caps()
        };
        let extent = choose_extent(
            &caps,
            RenderSize {
                width: 4000,
                height: 4000,
            },
        );
        assert_eq!((extent.width, extent.height), (800, 600));
    }

    #[rstest]
    #[case(2, 3, 3)]
    #[case(2, 0, 3)]
    #[case(3, 3, 3)]
    #[case(1, 8, 2)]
    fn image_count_is_min_plus_one_capped(#[case] min: u32, #[case] max: u32, #[case] want: u32) {
        let caps = vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            ..Default::default()
        };
        assert_eq!(choose_image_count(&caps), want);
    }

    #[rstest]
    #[case(&[vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX], PresentPreference::Mailbox, vk::PresentModeKHR::MAILBOX)]
    #[case(&[vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE], PresentPreference::Mailbox, vk::PresentModeKHR::FIFO)]
    #[case(&[vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX], PresentPreference::Fifo, vk::PresentModeKHR::FIFO)]
    fn present_mode_honours_preference(
        #[case] modes: &[vk::PresentModeKHR],
        #[case] pref: PresentPreference,
        #[case] want: vk::PresentModeKHR,
    ) {
        assert_eq!(choose_present_mode(modes, pref), want);
    }

    fn memory_props(flags: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: flags.len() as u32,
            ..Default::default()
        };
        for (slot, f) in props.memory_types.iter_mut().zip(flags) {
            slot.property_flags = *f;
        }
        props
    }

    #[test]
    fn memory_type_respects_mask_and_flags() {
        let props = memory_props(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            vk::MemoryPropertyFlags::DEVICE_LOCAL | vk::MemoryPropertyFlags::HOST_VISIBLE,
        ]);
        let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        assert_eq!(find_memory_type(&props, 0b111, host).unwrap(), 1);
        assert_eq!(
            find_memory_type(&props, 0b101, vk::MemoryPropertyFlags::DEVICE_LOCAL).unwrap(),
            0
        );
        assert_eq!(
            find_memory_type(&props, 0b100, vk::MemoryPropertyFlags::DEVICE_LOCAL).unwrap(),
            2
        );
    }

    #[test]
    fn memory_type_missing_is_reported() {
        let props = memory_props(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);
        let err = find_memory_type(&props, 0b1, vk::MemoryPropertyFlags::HOST_VISIBLE);
        assert!(matches!(err, Err(RenderError::NoMemoryType { type_bits: 1, .. })));
        // Matching flags are useless when the mask excludes them.
        assert!(find_memory_type(&props, 0b10, vk::MemoryPropertyFlags::DEVICE_LOCAL).is_err());
    }

    #[test]
    fn stencil_formats_get_both_aspects() {
        assert_eq!(depth_aspect(vk::Format::D32_SFLOAT), vk::ImageAspectFlags::DEPTH);
        assert!(depth_aspect(vk::Format::D24_UNORM_S8_UINT).contains(vk::ImageAspectFlags::STENCIL));
    }
}
