// SPDX-License-Identifier: CEPL-1.0
//! Construction, one frame, and teardown against the recording backend.

mod common;

use cave_render::mock::{Call, MockBackend, ObjectKind};
use cave_render::{FrameState, RenderError, RendererConfig};
use rstest::rstest;

use common::{
    assert_vulkan_failure, build, build_with, config, destroyed_kinds, expect_err, frame_submits,
    presents,
};

#[test]
fn one_frame_end_to_end() {
    let (renderer, rec) = build(MockBackend::new());
    let mut renderer = renderer.unwrap();
    assert_eq!(renderer.extent().width, 640);
    assert_eq!(renderer.extent().height, 480);

    let before = rec.calls().len();
    renderer.render_frame().unwrap();
    let frame_calls = rec.calls().split_off(before);

    assert_eq!(frame_submits(&frame_calls), 1);
    assert_eq!(presents(&frame_calls), [0]);
    assert_eq!(renderer.frame_state(), FrameState::Idle);
    assert_eq!(renderer.frames_rendered(), 1);

    drop(renderer);
    assert_eq!(rec.live_objects(), 0);
    assert!(rec.violations().is_empty(), "{:?}", rec.violations());
}

#[test]
fn frames_rotate_through_swapchain_images() {
    let (renderer, rec) = build(MockBackend::new());
    let mut renderer = renderer.unwrap();
    assert_eq!(renderer.surface().image_count(), 3);

    for _ in 0..5 {
        renderer.render_frame().unwrap();
    }

    let calls = rec.calls();
    assert_eq!(frame_submits(&calls), 5);
    assert_eq!(presents(&calls), [0, 1, 2, 0, 1]);
    assert_eq!(renderer.frames_rendered(), 5);
    assert!(rec.violations().is_empty(), "{:?}", rec.violations());
}

#[test]
fn destruction_is_exact_reverse_of_creation() {
    let (renderer, rec) = build(MockBackend::new());
    let mut renderer = renderer.unwrap();
    renderer.render_frame().unwrap();
    drop(renderer);

    let calls = rec.calls();
    let split = calls
        .iter()
        .rposition(|c| *c == Call::DeviceWaitIdle)
        .expect("teardown waits for the device first");
    let (lifetime, teardown) = calls.split_at(split);

    // Transients (staging buffers, one-shot command buffers, shader modules) come and go
    // before teardown; only what is still alive at that point matters.
    let mut alive: Vec<(ObjectKind, u64)> = Vec::new();
    for call in lifetime {
        match call {
            Call::Create { kind, handle } => alive.push((*kind, *handle)),
            Call::Destroy { handle, .. } => alive.retain(|&(_, h)| h != *handle),
            _ => {}
        }
    }
    let destroyed: Vec<(ObjectKind, u64)> = teardown
        .iter()
        .filter_map(|c| match c {
            Call::Destroy { kind, handle } => Some((*kind, *handle)),
            _ => None,
        })
        .collect();

    alive.reverse();
    assert_eq!(destroyed, alive);
    assert_eq!(destroyed.last().map(|d| d.0), Some(ObjectKind::Instance));
    assert!(rec.violations().is_empty(), "{:?}", rec.violations());
}

#[test]
fn transients_do_not_outlive_construction() {
    let (renderer, rec) = build(MockBackend::new());
    let renderer = renderer.unwrap();

    assert_eq!(rec.live_of(ObjectKind::ShaderModule), 0);
    // One per swapchain image, nothing left over from uploads.
    assert_eq!(
        rec.live_of(ObjectKind::CommandBuffer),
        renderer.surface().image_count()
    );
    // Uniform pair, vertex, index.
    assert_eq!(rec.live_of(ObjectKind::Buffer), 4);
    assert_eq!(rec.live_of(ObjectKind::Framebuffer), 3);
    assert_eq!(rec.live_of(ObjectKind::Sampler), 1);
}

#[rstest]
#[case::instance("vkCreateInstance", 1)]
#[case::surface("vkCreateSurfaceKHR", 1)]
#[case::device("vkCreateDevice", 1)]
#[case::command_pool("vkCreateCommandPool", 1)]
#[case::swapchain("vkCreateSwapchainKHR", 1)]
#[case::second_image_view("vkCreateImageView", 2)]
#[case::depth_image("vkCreateImage", 1)]
#[case::depth_memory("vkAllocateMemory", 1)]
#[case::depth_transition("vkQueueSubmit", 1)]
#[case::render_pass("vkCreateRenderPass", 1)]
#[case::last_framebuffer("vkCreateFramebuffer", 3)]
#[case::uniform_staging("vkCreateBuffer", 2)]
#[case::descriptor_pool("vkCreateDescriptorPool", 1)]
#[case::set_layout("vkCreateDescriptorSetLayout", 1)]
#[case::fragment_module("vkCreateShaderModule", 2)]
#[case::pipeline("vkCreateGraphicsPipelines", 1)]
#[case::texture_staging_write("vkMapMemory", 1)]
#[case::sampler("vkCreateSampler", 1)]
#[case::vertex_upload("vkQueueSubmit", 3)]
#[case::descriptor_set("vkAllocateDescriptorSets", 1)]
#[case::recording("vkBeginCommandBuffer", 5)]
#[case::second_fence("vkCreateFence", 2)]
#[case::last_semaphore("vkCreateSemaphore", 5)]
fn construction_failure_releases_everything(#[case] call: &'static str, #[case] nth: usize) {
    let (renderer, rec) = build(MockBackend::new().fail_on(call, nth));

    let err = expect_err(renderer);
    assert_vulkan_failure(&err, call);
    assert_eq!(rec.live_objects(), 0);
    assert!(rec.violations().is_empty(), "{:?}", rec.violations());
}

#[test]
fn failed_frame_leaves_renderer_in_invalid_state() {
    let (renderer, rec) = build(MockBackend::new().fail_on("vkAcquireNextImageKHR", 1));
    let mut renderer = renderer.unwrap();

    let err = renderer.render_frame().unwrap_err();
    assert_vulkan_failure(&err, "vkAcquireNextImageKHR");
    assert_eq!(renderer.frame_state(), FrameState::UniformsUpdated);

    let err = renderer.render_frame().unwrap_err();
    assert!(matches!(err, RenderError::InvalidState(_)), "{err:?}");
    assert_eq!(frame_submits(&rec.calls()), 0);

    drop(renderer);
    assert_eq!(rec.live_objects(), 0);
    assert!(rec.violations().is_empty(), "{:?}", rec.violations());
}

#[test]
fn validation_installs_messenger_destroyed_before_instance() {
    let (renderer, rec) = build(MockBackend::new());
    let renderer = renderer.unwrap();
    assert!(renderer.context().debug_messenger.is_some());
    assert!(rec.validation_enabled());
    drop(renderer);

    let destroyed = destroyed_kinds(&rec.calls());
    assert_eq!(
        destroyed[destroyed.len() - 2..],
        [ObjectKind::DebugMessenger, ObjectKind::Instance]
    );
}

#[rstest]
#[case::no_debug_utils(MockBackend::new().with_debug_utils(false))]
#[case::messenger_creation_fails(MockBackend::new().fail_on("vkCreateDebugUtilsMessengerEXT", 1))]
fn validation_fails_closed(#[case] gpu: MockBackend) {
    let (renderer, rec) = build(gpu);
    let mut renderer = renderer.unwrap();

    assert!(renderer.context().debug_messenger.is_none());
    assert_eq!(rec.live_of(ObjectKind::DebugMessenger), 0);
    renderer.render_frame().unwrap();
}

#[test]
fn validation_off_skips_messenger() {
    let config = RendererConfig {
        validation: false,
        ..config()
    };
    let (renderer, rec) = build_with(MockBackend::new(), &config);
    let renderer = renderer.unwrap();
    assert!(renderer.context().debug_messenger.is_none());
    assert!(!rec.validation_enabled());
}

#[test]
fn missing_validation_layer_is_reported() {
    let (renderer, rec) = build(MockBackend::new().with_validation_layer(false));
    let err = expect_err(renderer);
    assert!(
        matches!(&err, RenderError::LayerMissing(name) if name == "VK_LAYER_KHRONOS_validation"),
        "{err:?}"
    );
    assert_eq!(rec.live_objects(), 0);
}

#[test]
fn missing_loader_is_backend_unavailable() {
    let (renderer, rec) = build(MockBackend::new().without_loader());
    let err = expect_err(renderer);
    assert!(matches!(err, RenderError::BackendUnavailable(_)), "{err:?}");
    assert!(rec.calls().is_empty());
}

#[rstest]
#[case::no_frames(RendererConfig { frames_in_flight: 0, ..config() })]
#[case::empty_window(RendererConfig { size: cave_render::RenderSize { width: 0, height: 480 }, ..config() })]
fn invalid_config_creates_nothing(#[case] config: RendererConfig) {
    let (renderer, rec) = build_with(MockBackend::new(), &config);
    let err = expect_err(renderer);
    assert!(matches!(err, RenderError::InvalidConfig(_)), "{err:?}");
    assert!(rec.calls().is_empty());
}

#[test]
fn missing_shader_unwinds() {
    let gpu = MockBackend::new();
    let rec = gpu.recorder();
    let shaders = common::shaders();
    let mut paths = shaders.paths.clone();
    paths.fragment_shader = paths.fragment_shader.with_file_name("missing.spv");

    let renderer = cave_render::Renderer::new(
        gpu,
        &config(),
        &paths,
        &common::SyntheticAssets::default(),
    );

    let err = expect_err(renderer);
    assert!(matches!(err, RenderError::Shader { .. }), "{err:?}");
    assert_eq!(rec.live_objects(), 0);
    assert!(rec.violations().is_empty(), "{:?}", rec.violations());
}
