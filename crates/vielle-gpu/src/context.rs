// SPDX-License-Identifier: CEPL-1.0
//! The device context: Vulkan instance, GPU selection, logical device, memory
//! allocator and the two command pools every other part records from.
//!
//! At most one context is live at a time. The only constructor,
//! [`Context::create_in`], takes the slot the context will live in and refuses
//! to build a second one into an occupied slot. Everything else borrows the
//! context, so the borrow checker keeps resources from outliving it.

use crate::config::ContextConfig;
use crate::error::{GpuError, Result};
use ash::ext::{debug_utils, descriptor_indexing, shader_object};
use ash::khr::{surface, swapchain};
use ash::{vk, Entry, Instance};
use gpu_allocator::vulkan::{
    Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc,
};
use gpu_allocator::{AllocationError, MemoryLocation};
use raw_window_handle::{HasDisplayHandle, RawDisplayHandle};
use std::cell::RefCell;
use std::ffi::{c_char, c_void, CStr, CString};
use std::mem::ManuallyDrop;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{debug, error, info, trace, warn};

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";
const ENGINE_NAME: &CStr = c"vielle";

pub(crate) const REQUIRED_DEVICE_EXTENSIONS: [&CStr; 3] =
    [swapchain::NAME, shader_object::NAME, descriptor_indexing::NAME];

pub struct Context {
    entry: Entry,
    instance: Instance,
    debug: Option<DebugMessenger>,

    gpu: vk::PhysicalDevice,
    properties: vk::PhysicalDeviceProperties,
    device: ash::Device,
    queue_family: u32,
    queue: vk::Queue,

    allocator: ManuallyDrop<RefCell<Allocator>>,
    command_pool: vk::CommandPool,
    transient_pool: vk::CommandPool,

    surface_loader: surface::Instance,
    swapchain_loader: swapchain::Device,
    shader_object: shader_object::Device,
    presentable: bool,
}

struct DebugMessenger {
    loader: debug_utils::Instance,
    messenger: vk::DebugUtilsMessengerEXT,
    // Handed to the callback as user data; boxed so the address is stable.
    errors: Box<AtomicU32>,
}

impl DebugMessenger {
    fn destroy(self) {
        // SAFETY: messenger came from this loader and is destroyed once.
        unsafe {
            self.loader
                .destroy_debug_utils_messenger(self.messenger, None)
        };
    }
}

/// Fails when `slot` already holds a live value.
pub(crate) fn ensure_vacant<T>(slot: &Option<T>) -> Result<()> {
    match slot {
        Some(_) => Err(GpuError::AlreadyInitialized),
        None => Ok(()),
    }
}

impl Context {
    /// Builds the context into `slot` and hands back a borrow of it.
    ///
    /// `display` provides the platform surface extensions; pass `None` for a
    /// headless context that can allocate and transfer but never present.
    /// An occupied `slot` is rejected with [`GpuError::AlreadyInitialized`]
    /// and left as it was.
    pub fn create_in<'s>(
        slot: &'s mut Option<Context>,
        display: Option<&dyn HasDisplayHandle>,
        config: &ContextConfig,
    ) -> Result<&'s Context> {
        ensure_vacant(slot)?;
        let ctx = Self::create(display, config)?;
        Ok(&*slot.insert(ctx))
    }

    fn create(display: Option<&dyn HasDisplayHandle>, config: &ContextConfig) -> Result<Self> {
        let display_raw = match display {
            Some(d) => Some(d.display_handle()?.as_raw()),
            None => None,
        };

        let entry = Entry::linked();
        let validation = config.validation && layer_available(&entry, VALIDATION_LAYER);
        if config.validation && !validation {
            warn!("validation requested but {VALIDATION_LAYER:?} is not installed");
        }

        let instance = create_instance(&entry, display_raw, &config.app_name, validation)?;

        let debug = if validation {
            match create_debug_messenger(&entry, &instance) {
                Ok(messenger) => Some(messenger),
                Err(e) => {
                    // SAFETY: nothing else was created from the instance yet.
                    unsafe { instance.destroy_instance(None) };
                    return Err(e);
                }
            }
        } else {
            None
        };

        let parts = match DeviceParts::create(&instance) {
            Ok(parts) => parts,
            Err(e) => {
                if let Some(debug) = debug {
                    debug.destroy();
                }
                // SAFETY: device creation cleaned up after itself.
                unsafe { instance.destroy_instance(None) };
                return Err(e);
            }
        };

        let surface_loader = surface::Instance::new(&entry, &instance);
        let swapchain_loader = swapchain::Device::new(&instance, &parts.device);
        let shader_object = shader_object::Device::new(&instance, &parts.device);

        Ok(Context {
            entry,
            instance,
            debug,
            gpu: parts.gpu,
            properties: parts.properties,
            device: parts.device,
            queue_family: parts.queue_family,
            queue: parts.queue,
            allocator: ManuallyDrop::new(RefCell::new(parts.allocator)),
            command_pool: parts.command_pool,
            transient_pool: parts.transient_pool,
            surface_loader,
            swapchain_loader,
            shader_object,
            presentable: display_raw.is_some(),
        })
    }

    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.gpu
    }

    pub fn properties(&self) -> &vk::PhysicalDeviceProperties {
        &self.properties
    }

    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    pub fn queue(&self) -> vk::Queue {
        self.queue
    }

    pub fn queue_family(&self) -> u32 {
        self.queue_family
    }

    /// Pool for long-lived, individually reset command buffers.
    pub fn command_pool(&self) -> vk::CommandPool {
        self.command_pool
    }

    /// Pool for single-time command buffers.
    pub fn transient_pool(&self) -> vk::CommandPool {
        self.transient_pool
    }

    /// `VK_EXT_shader_object` entry points, including the dynamic state
    /// commands that come with it.
    pub fn shader_object(&self) -> &shader_object::Device {
        &self.shader_object
    }

    pub(crate) fn surface_loader(&self) -> &surface::Instance {
        &self.surface_loader
    }

    pub(crate) fn swapchain_loader(&self) -> &swapchain::Device {
        &self.swapchain_loader
    }

    /// False for headless contexts, which lack the platform surface extensions.
    pub fn is_presentable(&self) -> bool {
        self.presentable
    }

    /// Errors reported by the validation layer since creation. Always 0
    /// when validation is off.
    pub fn validation_errors(&self) -> u32 {
        self.debug
            .as_ref()
            .map_or(0, |debug| debug.errors.load(Ordering::Relaxed))
    }

    pub fn is_validating(&self) -> bool {
        self.debug.is_some()
    }

    pub fn format_properties(&self, format: vk::Format) -> vk::FormatProperties {
        // SAFETY: gpu is the physical device the instance enumerated.
        unsafe {
            self.instance
                .get_physical_device_format_properties(self.gpu, format)
        }
    }

    pub fn wait_idle(&self) -> Result<()> {
        // SAFETY: the device is live; no other thread submits.
        unsafe { self.device.device_wait_idle() }.map_err(GpuError::WaitIdle)
    }

    pub(crate) fn allocate(
        &self,
        name: &str,
        requirements: vk::MemoryRequirements,
        location: MemoryLocation,
        linear: bool,
    ) -> Result<Allocation, AllocationError> {
        self.allocator.borrow_mut().allocate(&AllocationCreateDesc {
            name,
            requirements,
            location,
            linear,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })
    }

    pub(crate) fn free(&self, allocation: Allocation) {
        if let Err(e) = self.allocator.borrow_mut().free(allocation) {
            error!("failed to free GPU allocation: {e}");
        }
    }
}

// Teardown runs in reverse acquisition order: pools, allocator, device,
// messenger, instance.
impl Drop for Context {
    fn drop(&mut self) {
        // SAFETY: every handle below is owned by the context and resources that
        // borrow it are gone by the time it drops.
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                warn!("device_wait_idle during teardown: {e}");
            }
            self.device
                .destroy_command_pool(self.transient_pool, None);
            self.device.destroy_command_pool(self.command_pool, None);
            // The allocator frees its memory blocks through the device.
            ManuallyDrop::drop(&mut self.allocator);
            self.device.destroy_device(None);
        }
        if let Some(debug) = self.debug.take() {
            debug.destroy();
        }
        // SAFETY: all children of the instance are destroyed above.
        unsafe { self.instance.destroy_instance(None) };
        debug!("device context destroyed");
    }
}

struct DeviceParts {
    gpu: vk::PhysicalDevice,
    properties: vk::PhysicalDeviceProperties,
    device: ash::Device,
    queue_family: u32,
    queue: vk::Queue,
    allocator: Allocator,
    command_pool: vk::CommandPool,
    transient_pool: vk::CommandPool,
}

impl DeviceParts {
    fn create(instance: &Instance) -> Result<Self> {
        let (gpu, queue_family) = select_gpu(instance)?;
        // SAFETY: gpu was enumerated from this instance.
        let properties = unsafe { instance.get_physical_device_properties(gpu) };
        let device = create_device(instance, gpu, queue_family)?;

        match Self::create_on_device(instance, gpu, &device, queue_family) {
            Ok((allocator, command_pool, transient_pool)) => {
                // SAFETY: family was requested with one queue at creation.
                let queue = unsafe { device.get_device_queue(queue_family, 0) };
                Ok(DeviceParts {
                    gpu,
                    properties,
                    device,
                    queue_family,
                    queue,
                    allocator,
                    command_pool,
                    transient_pool,
                })
            }
            Err(e) => {
                // SAFETY: children were released by create_on_device.
                unsafe { device.destroy_device(None) };
                Err(e)
            }
        }
    }

    fn create_on_device(
        instance: &Instance,
        gpu: vk::PhysicalDevice,
        device: &ash::Device,
        queue_family: u32,
    ) -> Result<(Allocator, vk::CommandPool, vk::CommandPool)> {
        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: device.clone(),
            physical_device: gpu,
            debug_settings: Default::default(),
            buffer_device_address: true,
            allocation_sizes: Default::default(),
        })
        .map_err(GpuError::CreateAllocator)?;

        let command_pool = create_command_pool(
            device,
            queue_family,
            vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
        )?;
        let transient_pool = match create_command_pool(
            device,
            queue_family,
            vk::CommandPoolCreateFlags::TRANSIENT | vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
        ) {
            Ok(pool) => pool,
            Err(e) => {
                // SAFETY: pool is unused.
                unsafe { device.destroy_command_pool(command_pool, None) };
                return Err(e);
            }
        };
        Ok((allocator, command_pool, transient_pool))
    }
}

fn layer_available(entry: &Entry, name: &CStr) -> bool {
    // SAFETY: plain enumeration through the linked loader.
    let layers = match unsafe { entry.enumerate_instance_layer_properties() } {
        Ok(layers) => layers,
        Err(_) => return false,
    };
    layers
        .iter()
        // SAFETY: layer_name is a NUL-terminated array filled by the loader.
        .any(|l| unsafe { CStr::from_ptr(l.layer_name.as_ptr()) } == name)
}

/// Instance extensions to enable. VK_KHR_surface is on for headless
/// contexts too: the device always enables VK_KHR_swapchain, which needs it.
pub(crate) fn instance_extensions(
    platform: &[&'static CStr],
    validation: bool,
) -> Vec<&'static CStr> {
    let mut extensions = platform.to_vec();
    if !extensions.contains(&surface::NAME) {
        extensions.push(surface::NAME);
    }
    if validation {
        extensions.push(debug_utils::NAME);
    }
    extensions
}

fn create_instance(
    entry: &Entry,
    display: Option<RawDisplayHandle>,
    app_name: &str,
    validation: bool,
) -> Result<Instance> {
    let app = CString::new(app_name).unwrap_or_else(|_| CString::from(ENGINE_NAME));
    let app_info = vk::ApplicationInfo {
        s_type: vk::StructureType::APPLICATION_INFO,
        p_application_name: app.as_ptr(),
        application_version: 0,
        p_engine_name: ENGINE_NAME.as_ptr(),
        engine_version: 0,
        api_version: vk::API_VERSION_1_3,
        ..Default::default()
    };

    let platform: Vec<&'static CStr> = match display {
        Some(raw) => ash_window::enumerate_required_extensions(raw)
            .map_err(|_| GpuError::InstanceExtensionsUnavailable)?
            .iter()
            // SAFETY: ash-window hands out pointers to static NUL-terminated names.
            .map(|&name| unsafe { CStr::from_ptr(name) })
            .collect(),
        None => Vec::new(),
    };
    let wanted = instance_extensions(&platform, validation);

    // SAFETY: plain enumeration through the linked loader.
    let available = unsafe { entry.enumerate_instance_extension_properties(None) }
        .map_err(GpuError::CreateInstance)?;
    let all_present = wanted.iter().all(|&wanted| {
        available.iter().any(|e| {
            // SAFETY: extension_name is a NUL-terminated array filled by the loader.
            unsafe { CStr::from_ptr(e.extension_name.as_ptr()) == wanted }
        })
    });
    if !all_present {
        return Err(GpuError::InstanceExtensionsUnavailable);
    }
    let extensions: Vec<*const c_char> = wanted.iter().map(|name| name.as_ptr()).collect();

    let layers = [VALIDATION_LAYER.as_ptr()];
    let create_info = vk::InstanceCreateInfo {
        s_type: vk::StructureType::INSTANCE_CREATE_INFO,
        p_application_info: &app_info,
        enabled_extension_count: extensions.len() as u32,
        pp_enabled_extension_names: extensions.as_ptr(),
        enabled_layer_count: if validation { layers.len() as u32 } else { 0 },
        pp_enabled_layer_names: layers.as_ptr(),
        ..Default::default()
    };

    // SAFETY: every pointer in create_info outlives this call.
    let instance = unsafe { entry.create_instance(&create_info, None) }
        .map_err(GpuError::CreateInstance)?;
    info!(
        "instance created (api 1.3, {} extensions, validation={validation})",
        extensions.len()
    );
    Ok(instance)
}

unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    user: *mut c_void,
) -> vk::Bool32 {
    // SAFETY: the loader passes a valid callback struct or null.
    let message = unsafe {
        if data.is_null() || (*data).p_message.is_null() {
            return vk::FALSE;
        }
        CStr::from_ptr((*data).p_message).to_string_lossy()
    };
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        if !user.is_null() {
            // SAFETY: user data is the messenger's boxed counter, which
            // outlives the messenger.
            unsafe { &*(user as *const AtomicU32) }.fetch_add(1, Ordering::Relaxed);
        }
        error!("[vulkan] {message}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        warn!("[vulkan] {message}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        debug!("[vulkan] {message}");
    } else {
        trace!("[vulkan] {message}");
    }
    vk::FALSE
}

fn create_debug_messenger(entry: &Entry, instance: &Instance) -> Result<DebugMessenger> {
    let loader = debug_utils::Instance::new(entry, instance);
    let errors = Box::new(AtomicU32::new(0));
    let create_info = vk::DebugUtilsMessengerCreateInfoEXT {
        s_type: vk::StructureType::DEBUG_UTILS_MESSENGER_CREATE_INFO_EXT,
        message_severity: vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
            | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
            | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
            | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        message_type: vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
            | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
            | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        pfn_user_callback: Some(debug_callback),
        p_user_data: &*errors as *const AtomicU32 as *mut c_void,
        ..Default::default()
    };
    // SAFETY: the instance was created with VK_EXT_debug_utils enabled.
    let messenger = unsafe { loader.create_debug_utils_messenger(&create_info, None) }
        .map_err(GpuError::CreateDebugMessenger)?;
    Ok(DebugMessenger {
        loader,
        messenger,
        errors,
    })
}

fn meets_feature_requirements(features: &vk::PhysicalDeviceFeatures) -> bool {
    features.sampler_anisotropy == vk::TRUE && features.sample_rate_shading == vk::TRUE
}

pub(crate) fn has_required_extensions(available: &[&CStr]) -> bool {
    REQUIRED_DEVICE_EXTENSIONS
        .iter()
        .all(|required| available.contains(required))
}

/// First family whose flags cover both graphics and compute.
pub(crate) fn find_queue_family(families: &[vk::QueueFamilyProperties]) -> Option<u32> {
    let wanted = vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE;
    families
        .iter()
        .position(|f| f.queue_count > 0 && f.queue_flags.contains(wanted))
        .map(|i| i as u32)
}

fn device_rank(kind: vk::PhysicalDeviceType) -> u8 {
    match kind {
        vk::PhysicalDeviceType::DISCRETE_GPU => 0,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 1,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 2,
        _ => 3,
    }
}

fn select_gpu(instance: &Instance) -> Result<(vk::PhysicalDevice, u32)> {
    // SAFETY: plain enumeration on a live instance.
    let mut gpus = unsafe { instance.enumerate_physical_devices() }
        .map_err(GpuError::EnumerateDevices)?;
    gpus.sort_by_key(|&gpu| {
        // SAFETY: gpu was just enumerated from this instance.
        device_rank(unsafe { instance.get_physical_device_properties(gpu) }.device_type)
    });

    let mut capable_without_queue = false;
    for gpu in gpus {
        // SAFETY: gpu was enumerated from this instance.
        let (features, extensions, families, props) = unsafe {
            (
                instance.get_physical_device_features(gpu),
                instance
                    .enumerate_device_extension_properties(gpu)
                    .map_err(GpuError::EnumerateDevices)?,
                instance.get_physical_device_queue_family_properties(gpu),
                instance.get_physical_device_properties(gpu),
            )
        };
        // SAFETY: names and device_name are NUL-terminated arrays.
        let names: Vec<&CStr> = extensions
            .iter()
            .map(|e| unsafe { CStr::from_ptr(e.extension_name.as_ptr()) })
            .collect();
        let name = unsafe { CStr::from_ptr(props.device_name.as_ptr()) }.to_string_lossy();

        if !meets_feature_requirements(&features) || !has_required_extensions(&names) {
            debug!("skipping {name}: missing features or extensions");
            continue;
        }
        match find_queue_family(&families) {
            Some(family) => {
                info!("gpu = {name} ({:?}), queue family {family}", props.device_type);
                return Ok((gpu, family));
            }
            None => {
                debug!("skipping {name}: no graphics+compute queue family");
                capable_without_queue = true;
            }
        }
    }

    Err(if capable_without_queue {
        GpuError::NoSuitableQueueFamily
    } else {
        GpuError::NoSuitableDevice
    })
}

fn create_device(
    instance: &Instance,
    gpu: vk::PhysicalDevice,
    queue_family: u32,
) -> Result<ash::Device> {
    let priorities = [1.0_f32];
    let queue_info = vk::DeviceQueueCreateInfo {
        s_type: vk::StructureType::DEVICE_QUEUE_CREATE_INFO,
        queue_family_index: queue_family,
        queue_count: 1,
        p_queue_priorities: priorities.as_ptr(),
        ..Default::default()
    };

    let extensions: Vec<*const c_char> = REQUIRED_DEVICE_EXTENSIONS
        .iter()
        .map(|e| e.as_ptr())
        .collect();
    let features = vk::PhysicalDeviceFeatures {
        sampler_anisotropy: vk::TRUE,
        sample_rate_shading: vk::TRUE,
        ..Default::default()
    };

    let mut address =
        vk::PhysicalDeviceBufferDeviceAddressFeatures::default().buffer_device_address(true);
    let mut indexing = vk::PhysicalDeviceDescriptorIndexingFeatures::default()
        .shader_sampled_image_array_non_uniform_indexing(true)
        .descriptor_binding_partially_bound(true)
        .runtime_descriptor_array(true);
    let mut shader_objects =
        vk::PhysicalDeviceShaderObjectFeaturesEXT::default().shader_object(true);
    let mut dynamic_rendering =
        vk::PhysicalDeviceDynamicRenderingFeatures::default().dynamic_rendering(true);
    let mut sync2 =
        vk::PhysicalDeviceSynchronization2Features::default().synchronization2(true);

    let create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(std::slice::from_ref(&queue_info))
        .enabled_extension_names(&extensions)
        .enabled_features(&features)
        .push_next(&mut address)
        .push_next(&mut indexing)
        .push_next(&mut shader_objects)
        .push_next(&mut dynamic_rendering)
        .push_next(&mut sync2);

    // SAFETY: the feature chain and name arrays outlive this call.
    unsafe { instance.create_device(gpu, &create_info, None) }.map_err(GpuError::CreateDevice)
}

fn create_command_pool(
    device: &ash::Device,
    queue_family: u32,
    flags: vk::CommandPoolCreateFlags,
) -> Result<vk::CommandPool> {
    let pool_info = vk::CommandPoolCreateInfo {
        s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
        queue_family_index: queue_family,
        flags,
        ..Default::default()
    };
    // SAFETY: queue_family exists on this device.
    unsafe { device.create_command_pool(&pool_info, None) }.map_err(GpuError::CreateCommandPool)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags, count: u32) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: count,
            ..Default::default()
        }
    }

    #[test]
    fn occupied_slot_is_rejected_untouched() {
        let slot = Some(7_u32);
        assert!(matches!(
            ensure_vacant(&slot),
            Err(GpuError::AlreadyInitialized)
        ));
        assert_eq!(slot, Some(7));
        assert!(ensure_vacant::<u32>(&None).is_ok());
    }

    #[test]
    fn queue_family_needs_graphics_and_compute_together() {
        let families = [
            family(vk::QueueFlags::TRANSFER, 2),
            family(vk::QueueFlags::COMPUTE, 4),
            family(vk::QueueFlags::GRAPHICS, 1),
            family(
                vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER,
                1,
            ),
        ];
        assert_eq!(find_queue_family(&families), Some(3));
        assert_eq!(find_queue_family(&families[..3]), None);
    }

    #[test]
    fn empty_family_is_skipped() {
        let families = [
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE, 0),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE, 1),
        ];
        assert_eq!(find_queue_family(&families), Some(1));
    }

    #[test]
    fn every_required_extension_must_be_present() {
        let all = [
            c"VK_KHR_maintenance1",
            swapchain::NAME,
            shader_object::NAME,
            descriptor_indexing::NAME,
        ];
        assert!(has_required_extensions(&all));
        assert!(!has_required_extensions(&all[..3]));
        assert!(!has_required_extensions(&[]));
    }

    #[test]
    fn headless_instance_still_enables_surface() {
        let extensions = instance_extensions(&[], false);
        assert_eq!(extensions, [surface::NAME]);
        let with_validation = instance_extensions(&[], true);
        assert_eq!(with_validation, [surface::NAME, debug_utils::NAME]);
    }

    #[test]
    fn platform_surface_extension_is_not_duplicated() {
        let platform = [surface::NAME, ash::khr::xlib_surface::NAME];
        let extensions = instance_extensions(&platform, false);
        assert_eq!(extensions, platform);
    }

    #[test]
    fn features_need_anisotropy_and_sample_shading() {
        let mut features = vk::PhysicalDeviceFeatures {
            sampler_anisotropy: vk::TRUE,
            ..Default::default()
        };
        assert!(!meets_feature_requirements(&features));
        features.sample_rate_shading = vk::TRUE;
        assert!(meets_feature_requirements(&features));
    }

    #[test]
    fn discrete_gpus_rank_first() {
        let mut kinds = [
            vk::PhysicalDeviceType::CPU,
            vk::PhysicalDeviceType::INTEGRATED_GPU,
            vk::PhysicalDeviceType::DISCRETE_GPU,
        ];
        kinds.sort_by_key(|&k| device_rank(k));
        assert_eq!(kinds[0], vk::PhysicalDeviceType::DISCRETE_GPU);
        assert_eq!(kinds[2], vk::PhysicalDeviceType::CPU);
    }
}
