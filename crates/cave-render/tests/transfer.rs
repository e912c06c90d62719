// SPDX-License-Identifier: CEPL-1.0
//! Staging uploads, readback and swapchain replacement.

mod common;

use cave_render::mock::{Call, MockBackend, ObjectKind};
use cave_render::{
    vk, BufferConfig, Camera, CameraUbo, DeviceContext, GpuBackend, InstanceConfig, Owned,
    PresentPreference, PresentationSurface, RenderError, RenderSize, Teardown, TransferEngine,
    HOST_VISIBLE,
};

use common::{build, SyntheticAssets};

/// Device context and transfer engine without the rest of the renderer.
fn transfer_rig(
    gpu: &mut MockBackend,
    teardown: &mut Teardown,
) -> (DeviceContext, TransferEngine) {
    let config = InstanceConfig::new("transfer tests", false).unwrap();
    let context = DeviceContext::new(gpu, teardown, &config).unwrap();
    let transfer = TransferEngine::new(gpu, teardown, &context).unwrap();
    (context, transfer)
}

#[test]
fn upload_round_trips_through_read_back() {
    let mut gpu = MockBackend::new();
    let rec = gpu.recorder();
    let mut teardown = Teardown::default();
    let (_context, transfer) = transfer_rig(&mut gpu, &mut teardown);

    let data: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
    let buffer = transfer
        .upload_buffer(
            &mut gpu,
            &mut teardown,
            &data,
            vk::BufferUsageFlags::VERTEX_BUFFER,
        )
        .unwrap();

    assert_eq!(buffer.size, 1000);
    assert_eq!(transfer.read_back(&mut gpu, &buffer).unwrap(), data);
    // Staging and readback buffers are gone; only the destination remains.
    assert_eq!(rec.live_of(ObjectKind::Buffer), 1);
    assert_eq!(rec.live_of(ObjectKind::CommandBuffer), 0);

    teardown.unwind(&mut gpu);
    assert_eq!(rec.live_objects(), 0);
    assert!(rec.violations().is_empty(), "{:?}", rec.violations());
}

#[test]
fn uploads_land_in_device_local_memory() {
    let mut gpu = MockBackend::new();
    let rec = gpu.recorder();
    let mut teardown = Teardown::default();
    let (_context, transfer) = transfer_rig(&mut gpu, &mut teardown);

    let buffer = transfer
        .upload_buffer(
            &mut gpu,
            &mut teardown,
            &[1, 2, 3, 4],
            vk::BufferUsageFlags::INDEX_BUFFER,
        )
        .unwrap();

    // The mock refuses to map anything that is not host visible.
    assert!(gpu.write_memory(buffer.memory, 0, &[9]).is_err());
    assert_eq!(rec.violations().len(), 1);
    teardown.unwind(&mut gpu);
}

#[test]
fn memory_type_selection() {
    let mut gpu = MockBackend::new();
    let mut teardown = Teardown::default();
    let (_context, transfer) = transfer_rig(&mut gpu, &mut teardown);

    // Type 0 is device local, type 1 host visible + coherent.
    assert_eq!(
        transfer
            .memory_type(0b11, vk::MemoryPropertyFlags::DEVICE_LOCAL)
            .unwrap(),
        0
    );
    assert_eq!(transfer.memory_type(0b11, HOST_VISIBLE).unwrap(), 1);
    assert!(matches!(
        transfer.memory_type(0b01, HOST_VISIBLE),
        Err(RenderError::NoMemoryType { type_bits: 0b01, .. })
    ));
    teardown.unwind(&mut gpu);
}

#[test]
fn failed_upload_releases_staging() {
    let mut gpu = MockBackend::new().fail_on("vkQueueSubmit", 1);
    let rec = gpu.recorder();
    let mut teardown = Teardown::default();
    let (_context, transfer) = transfer_rig(&mut gpu, &mut teardown);
    let tracked = teardown.len();

    let err = transfer
        .upload_buffer(
            &mut gpu,
            &mut teardown,
            &[0; 64],
            vk::BufferUsageFlags::VERTEX_BUFFER,
        )
        .unwrap_err();
    assert!(matches!(err, RenderError::Vulkan { call: "vkQueueSubmit", .. }));

    // The destination buffer and memory stay tracked; staging and the command buffer do not.
    assert_eq!(teardown.len(), tracked + 2);
    assert_eq!(rec.live_of(ObjectKind::Buffer), 1);
    assert_eq!(rec.live_of(ObjectKind::CommandBuffer), 0);
    teardown.unwind(&mut gpu);
    assert_eq!(rec.live_objects(), 0);
}

#[test]
fn host_writes_reach_device_buffer_through_copy() {
    let mut gpu = MockBackend::new();
    let rec = gpu.recorder();
    let mut teardown = Teardown::default();
    let (_context, transfer) = transfer_rig(&mut gpu, &mut teardown);

    let staging = transfer
        .create_buffer(
            &mut gpu,
            &mut teardown,
            &BufferConfig::new(16, vk::BufferUsageFlags::TRANSFER_SRC).unwrap(),
            HOST_VISIBLE,
        )
        .unwrap();
    let device = transfer
        .create_buffer(
            &mut gpu,
            &mut teardown,
            &BufferConfig::new(16, vk::BufferUsageFlags::TRANSFER_DST).unwrap(),
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )
        .unwrap();
    let payload: Vec<u8> = (1..=16).collect();

    transfer.write_host(&mut gpu, &staging, &payload).unwrap();
    transfer.copy_buffer(&mut gpu, &staging, &device, 16).unwrap();

    assert_eq!(rec.buffer_contents(device.buffer).unwrap(), payload);
    teardown.unwind(&mut gpu);
    assert!(rec.violations().is_empty(), "{:?}", rec.violations());
}

#[test]
fn unsupported_transition_is_rejected() {
    let mut gpu = MockBackend::new();
    let mut teardown = Teardown::default();
    let (_context, transfer) = transfer_rig(&mut gpu, &mut teardown);

    let err = transfer
        .transition_image_layout(
            &mut gpu,
            vk::Image::null(),
            vk::ImageLayout::PRESENT_SRC_KHR,
            vk::ImageLayout::GENERAL,
            vk::ImageAspectFlags::COLOR,
        )
        .unwrap_err();
    assert!(matches!(err, RenderError::InvalidConfig(_)), "{err:?}");
    teardown.unwind(&mut gpu);
}

#[test]
fn mesh_and_texture_reach_the_device() {
    let (renderer, rec) = build(MockBackend::new());
    let mut renderer = renderer.unwrap();
    let assets = SyntheticAssets::default();
    let mesh = *renderer.mesh();

    assert_eq!(mesh.vertex_count, 3);
    assert_eq!(mesh.index_count, 3);
    assert_eq!(
        renderer.read_back(&mesh.vertex_buffer).unwrap(),
        bytemuck::cast_slice::<_, u8>(&assets.mesh.vertices)
    );
    assert_eq!(
        renderer.read_back(&mesh.index_buffer).unwrap(),
        bytemuck::cast_slice::<_, u8>(&assets.mesh.indices)
    );

    assert_eq!(
        rec.image_contents(mesh.texture.image).unwrap(),
        assets.texture.pixels
    );
    assert_eq!(
        rec.image_layout(mesh.texture.image),
        Some(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
    );
    assert!(mesh.texture.sampler.is_some());
    assert_eq!(
        rec.image_layout(renderer.depth().image),
        Some(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
    );
    assert!(renderer.depth().sampler.is_none());
}

#[test]
fn frame_refreshes_camera_uniforms() {
    let (renderer, rec) = build(MockBackend::new());
    let mut renderer = renderer.unwrap();
    let device = renderer.uniforms().device;
    assert_eq!(rec.buffer_contents(device.buffer).unwrap(), vec![0; 128]);

    renderer.render_frame().unwrap();

    let expected = Camera::default().uniforms(renderer.extent());
    let bytes = renderer.read_back(&device).unwrap();
    assert_eq!(bytes.len() as vk::DeviceSize, CameraUbo::SIZE);
    assert_eq!(bytemuck::pod_read_unaligned::<CameraUbo>(&bytes), expected);
}

#[test]
fn old_swapchain_retires_after_replacement_exists() {
    let mut gpu = MockBackend::new();
    let rec = gpu.recorder();
    let mut teardown = Teardown::default();
    let (context, transfer) = transfer_rig(&mut gpu, &mut teardown);
    let size = RenderSize {
        width: 640,
        height: 480,
    };

    let first = PresentationSurface::new(
        &mut gpu,
        &mut teardown,
        &context,
        transfer.pool(),
        size,
        PresentPreference::Mailbox,
        None,
    )
    .unwrap();

    // Per-image objects go first; the swapchain itself is handed to the replacement.
    for image in &first.images {
        assert!(teardown.forget(Owned::ImageView(image.view)));
        assert!(teardown.forget(Owned::CommandBuffer {
            pool: transfer.pool(),
            cmd: image.command_buffer,
        }));
        gpu.destroy_image_view(image.view);
        gpu.free_command_buffer(transfer.pool(), image.command_buffer);
    }
    assert!(teardown.forget(Owned::Swapchain(first.swapchain)));

    let second = PresentationSurface::new(
        &mut gpu,
        &mut teardown,
        &context,
        transfer.pool(),
        size,
        PresentPreference::Fifo,
        Some(first.swapchain),
    )
    .unwrap();

    let calls = rec.calls();
    let position = |wanted: &Call| calls.iter().position(|c| c == wanted).unwrap();
    let created = position(&Call::Create {
        kind: ObjectKind::Swapchain,
        handle: vk::Handle::as_raw(second.swapchain),
    });
    let retired = position(&Call::Destroy {
        kind: ObjectKind::Swapchain,
        handle: vk::Handle::as_raw(first.swapchain),
    });
    assert!(created < retired);
    assert_eq!(rec.swapchain_configs()[1].old_swapchain, first.swapchain);
    assert_eq!(second.present_mode, vk::PresentModeKHR::FIFO);

    teardown.unwind(&mut gpu);
    assert_eq!(rec.live_objects(), 0);
    assert!(rec.violations().is_empty(), "{:?}", rec.violations());
}
