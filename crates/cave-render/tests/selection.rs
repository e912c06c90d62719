// SPDX-License-Identifier: CEPL-1.0
//! Adapter selection, queue sharing and depth format as seen through a full renderer build.

mod common;

use cave_render::mock::{MockAdapter, MockBackend, MockQueueFamily};
use cave_render::{vk, GpuBackend, PresentPreference, RenderError, RendererConfig, Sharing};
use rstest::rstest;

use common::{build, build_with, config, expect_err};

fn format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
    vk::SurfaceFormatKHR {
        format,
        color_space,
    }
}

fn extent(width: u32, height: u32) -> vk::Extent2D {
    vk::Extent2D { width, height }
}

#[rstest]
#[case::missing_swapchain_extension(MockAdapter { extensions: Vec::new(), ..MockAdapter::suitable() })]
#[case::no_surface_formats(MockAdapter { formats: Vec::new(), ..MockAdapter::suitable() })]
#[case::no_present_modes(MockAdapter { present_modes: Vec::new(), ..MockAdapter::suitable() })]
#[case::no_presenting_family(MockAdapter {
    queue_families: vec![MockQueueFamily { flags: vk::QueueFlags::GRAPHICS, count: 1, present: false }],
    ..MockAdapter::suitable()
})]
#[case::graphics_family_without_queues(MockAdapter {
    queue_families: vec![MockQueueFamily { flags: vk::QueueFlags::GRAPHICS, count: 0, present: true }],
    ..MockAdapter::suitable()
})]
fn first_suitable_adapter_wins(#[case] unsuitable: MockAdapter) {
    let runner_up = MockAdapter {
        formats: vec![format(
            vk::Format::R8G8B8A8_UNORM,
            vk::ColorSpaceKHR::SRGB_NONLINEAR,
        )],
        ..MockAdapter::suitable()
    };
    let gpu =
        MockBackend::new().with_adapters(vec![unsuitable, MockAdapter::suitable(), runner_up]);
    let devices = gpu.enumerate_physical_devices().unwrap();

    let (renderer, _rec) = build(gpu);
    let renderer = renderer.unwrap();

    assert_eq!(renderer.context().physical_device, devices[1]);
    assert_eq!(renderer.surface().format.format, vk::Format::B8G8R8A8_UNORM);
}

#[test]
fn no_suitable_adapter() {
    let gpu = MockBackend::new().with_adapters(vec![MockAdapter {
        extensions: Vec::new(),
        ..MockAdapter::suitable()
    }]);
    let (renderer, rec) = build(gpu);
    assert!(matches!(expect_err(renderer), RenderError::NoSuitableDevice));
    assert_eq!(rec.live_objects(), 0);
}

#[test]
fn separate_present_family_shares_concurrently() {
    let gpu = MockBackend::new().with_adapters(vec![MockAdapter::split_queues()]);
    let (renderer, rec) = build(gpu);
    let mut renderer = renderer.unwrap();

    let families = renderer.context().families;
    assert_eq!((families.graphics, families.present), (0, 1));
    assert_eq!(rec.device_queue_families(), [0, 1]);
    assert_eq!(rec.swapchain_configs()[0].sharing, Sharing::Concurrent(vec![0, 1]));
    assert_ne!(
        renderer.context().graphics_queue,
        renderer.context().present_queue
    );

    renderer.render_frame().unwrap();
    assert!(rec.violations().is_empty(), "{:?}", rec.violations());
}

#[test]
fn shared_family_is_exclusive() {
    let (renderer, rec) = build(MockBackend::new());
    let renderer = renderer.unwrap();
    assert_eq!(rec.device_queue_families(), [0]);
    assert_eq!(rec.swapchain_configs()[0].sharing, Sharing::Exclusive);
    assert_eq!(
        renderer.context().graphics_queue,
        renderer.context().present_queue
    );
}

#[test]
fn negotiated_values_reach_the_swapchain() {
    let mut adapter = MockAdapter::suitable();
    adapter.capabilities.current_extent = extent(u32::MAX, u32::MAX);
    adapter.capabilities.min_image_extent = extent(1, 1);
    adapter.capabilities.max_image_extent = extent(320, 240);
    adapter.capabilities.min_image_count = 2;
    adapter.capabilities.max_image_count = 0;
    adapter.present_modes = vec![vk::PresentModeKHR::FIFO];

    let config = RendererConfig {
        present_mode: PresentPreference::Mailbox,
        ..config()
    };
    let (renderer, rec) = build_with(MockBackend::new().with_adapters(vec![adapter]), &config);
    let renderer = renderer.unwrap();

    let swapchain = &rec.swapchain_configs()[0];
    assert_eq!(swapchain.extent, extent(320, 240));
    assert_eq!(swapchain.image_count, 3);
    assert_eq!(swapchain.present_mode, vk::PresentModeKHR::FIFO);
    assert_eq!(renderer.surface().framebuffers.len(), 3);
    assert_eq!(
        (renderer.depth().width, renderer.depth().height),
        (320, 240)
    );
}

#[rstest]
#[case::d32_first(vec![vk::Format::D32_SFLOAT, vk::Format::D24_UNORM_S8_UINT], vk::Format::D32_SFLOAT)]
#[case::stencil_fallback(vec![vk::Format::D24_UNORM_S8_UINT], vk::Format::D24_UNORM_S8_UINT)]
fn depth_format_is_first_supported_candidate(
    #[case] supported: Vec<vk::Format>,
    #[case] expected: vk::Format,
) {
    let gpu = MockBackend::new().with_adapters(vec![MockAdapter {
        depth_formats: supported,
        ..MockAdapter::suitable()
    }]);
    let (renderer, _rec) = build(gpu);
    assert_eq!(renderer.unwrap().depth().format, expected);
}

#[test]
fn no_depth_format() {
    let gpu = MockBackend::new().with_adapters(vec![MockAdapter {
        depth_formats: Vec::new(),
        ..MockAdapter::suitable()
    }]);
    let (renderer, rec) = build(gpu);
    assert!(matches!(expect_err(renderer), RenderError::NoDepthFormat));
    assert_eq!(rec.live_objects(), 0);
}

#[test]
fn no_host_visible_memory() {
    let gpu = MockBackend::new().with_adapters(vec![MockAdapter {
        memory_types: vec![vk::MemoryPropertyFlags::DEVICE_LOCAL],
        ..MockAdapter::suitable()
    }]);
    let (renderer, rec) = build(gpu);
    let err = expect_err(renderer);
    assert!(matches!(err, RenderError::NoMemoryType { .. }), "{err:?}");
    assert_eq!(rec.live_objects(), 0);
    assert!(rec.violations().is_empty(), "{:?}", rec.violations());
}
