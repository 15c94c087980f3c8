// SPDX-License-Identifier: CEPL-1.0
//! Swapchain tests against a real X11 window. Run with
//! `cargo test -- --ignored` inside an X session with a Vulkan 1.3 GPU.
#![cfg(target_os = "linux")]

use vielle_gpu::{
    color_range, vk, BarrierBuilder, Context, ContextConfig, FrameStatus, GpuError,
    PresentPolicy, Surface, SurfaceConfig, SyncScope,
};
use vielle_platform::winit::{
    dpi::PhysicalSize,
    event_loop::EventLoop,
    platform::x11::EventLoopBuilderExtX11,
    window::Window,
};

fn extent(width: u32, height: u32) -> vk::Extent2D {
    vk::Extent2D { width, height }
}

/// Clears the acquired image and presents it. False when the swapchain
/// reported out of date, which still leaves it usable after a resize.
fn present_clear(surface: &mut Surface<'_>, device: &ash::Device) -> bool {
    let status = surface
        .submit_frame(|surface, cmd| {
            let image = surface.current_image();
            let mut barriers = BarrierBuilder::new();
            barriers
                .transition(image, color_range(1, 1), SyncScope::NONE, SyncScope::TRANSFER_DST)
                .build_and_run(device, cmd);
            let clear = vk::ClearColorValue {
                float32: [0.2, 0.4, 0.6, 1.0],
            };
            // SAFETY: the image is in TRANSFER_DST and the swapchain allows it.
            unsafe {
                device.cmd_clear_color_image(
                    cmd,
                    image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &clear,
                    &[color_range(1, 1)],
                )
            };
            barriers
                .transition(image, color_range(1, 1), SyncScope::TRANSFER_DST, SyncScope::PRESENT)
                .build_and_run(device, cmd);
        })
        .unwrap();
    status == FrameStatus::Ready(())
}

#[test]
#[ignore = "needs an X11 display and a Vulkan 1.3 device with VK_EXT_shader_object"]
fn swapchain_survives_rejected_resizes() {
    let event_loop = EventLoop::<()>::with_user_event()
        .with_any_thread(true)
        .build()
        .unwrap();
    #[allow(deprecated)]
    let window = event_loop
        .create_window(
            Window::default_attributes()
                .with_title("vielle swapchain test")
                .with_inner_size(PhysicalSize::new(320, 240)),
        )
        .unwrap();

    let mut slot = None;
    let config = ContextConfig {
        validation: true,
        ..Default::default()
    };
    let ctx = Context::create_in(&mut slot, Some(&event_loop), &config).unwrap();
    let device = ctx.device();
    let size = window.inner_size();
    let mut surface = Surface::create(
        ctx,
        &window,
        &window,
        extent(size.width, size.height),
        SurfaceConfig::default(),
    )
    .unwrap();
    assert!(surface.image_count() <= 8);
    present_clear(&mut surface, device);

    // A minimised window reports zero area: the swapchain must stay as it was.
    ctx.wait_idle().unwrap();
    let before = (surface.raw(), surface.extent(), surface.image_count());
    for zero in [extent(0, 0), extent(size.width, 0), extent(0, size.height)] {
        let err = surface.resize(zero).unwrap_err();
        assert!(matches!(err, GpuError::InvalidSurfaceSize { .. }), "{zero:?}");
        assert_eq!(
            (surface.raw(), surface.extent(), surface.image_count()),
            before
        );
    }
    for _ in 0..3 {
        present_clear(&mut surface, device);
    }

    // Policy switches rebuild the swapchain and are remembered.
    ctx.wait_idle().unwrap();
    surface.set_present_policy(PresentPolicy::Mailbox).unwrap();
    assert_eq!(surface.config().present_policy, PresentPolicy::Mailbox);
    assert_ne!(surface.raw(), before.0);
    present_clear(&mut surface, device);

    ctx.wait_idle().unwrap();
    surface.resize(surface.extent()).unwrap();
    present_clear(&mut surface, device);

    ctx.wait_idle().unwrap();
    drop(surface);
    assert_eq!(ctx.validation_errors(), 0);
}
