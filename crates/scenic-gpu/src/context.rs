//! Headless Vulkan device context.
//!
//! The viewer's window layer owns presentation; this context only needs a
//! graphics queue, multi-draw indirect with per-draw first instance, and
//! buffer device addresses for the instance storage reference.

use crate::deferred::DeferredDeletionQueue;
use crate::device::DeviceBackend;
use crate::error::{GpuError, Result};
use crate::memory::GpuAllocator;
use ash::vk;
use parking_lot::Mutex;
use std::ffi::{CStr, CString};
use std::sync::Arc;

/// Vulkan instance, device and buffer allocator.
pub struct GpuContext {
    // Keeps the loader alive for the lifetime of the instance.
    #[allow(dead_code)]
    entry: ash::Entry,
    instance: ash::Instance,
    physical_device: vk::PhysicalDevice,
    device: Arc<ash::Device>,
    device_name: String,
    allocator: Arc<Mutex<GpuAllocator>>,
    deletions: Arc<Mutex<DeferredDeletionQueue>>,
    graphics_queue_family: u32,
    graphics_queue: vk::Queue,
}

impl GpuContext {
    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    pub fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    pub fn graphics_queue_family(&self) -> u32 {
        self.graphics_queue_family
    }

    /// Buffer backend sharing this context's allocator and deletion queue.
    pub fn buffer_backend(&self) -> DeviceBackend {
        DeviceBackend::new(self.allocator.clone(), self.deletions.clone())
    }

    /// Wait for the device to be idle.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn wait_idle(&self) -> Result<()> {
        unsafe {
            self.device.device_wait_idle()?;
        }
        Ok(())
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();

            let mut allocator = self.allocator.lock();
            if let Err(e) = self.deletions.lock().flush(&mut allocator) {
                tracing::error!("Failed to flush retired buffers: {e}");
            }
            // All VkDeviceMemory must be gone before the device.
            allocator.shutdown();
            drop(allocator);

            self.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
    }
}

/// Builder for creating a GPU context.
pub struct GpuContextBuilder {
    app_name: String,
    enable_validation: bool,
    frames_in_flight: usize,
}

impl Default for GpuContextBuilder {
    fn default() -> Self {
        Self {
            app_name: "Scenic".to_string(),
            enable_validation: cfg!(debug_assertions),
            frames_in_flight: 2,
        }
    }
}

impl GpuContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    #[must_use]
    pub fn validation(mut self, enable: bool) -> Self {
        self.enable_validation = enable;
        self
    }

    /// Frames retired storage is kept alive for.
    #[must_use]
    pub fn frames_in_flight(mut self, frames: usize) -> Self {
        self.frames_in_flight = frames;
        self
    }

    pub fn build(self) -> Result<GpuContext> {
        let entry = unsafe { ash::Entry::load() }.map_err(|e| GpuError::Loading(e.to_string()))?;

        let instance = unsafe { create_instance(&entry, &self.app_name, self.enable_validation) }?;

        let (physical_device, device_name) = match unsafe { select_physical_device(&instance) } {
            Ok(selected) => selected,
            Err(e) => {
                unsafe { instance.destroy_instance(None) };
                return Err(e);
            }
        };
        tracing::info!("Selected GPU: {device_name}");

        let created = unsafe { create_device(&instance, physical_device) };
        let (device, graphics_queue_family, graphics_queue) = match created {
            Ok(created) => created,
            Err(e) => {
                unsafe { instance.destroy_instance(None) };
                return Err(e);
            }
        };
        let device = Arc::new(device);

        let allocator = unsafe { GpuAllocator::new(&instance, device.clone(), physical_device) }?;

        Ok(GpuContext {
            entry,
            instance,
            physical_device,
            device,
            device_name,
            allocator: Arc::new(Mutex::new(allocator)),
            deletions: Arc::new(Mutex::new(DeferredDeletionQueue::new(self.frames_in_flight))),
            graphics_queue_family,
            graphics_queue,
        })
    }
}

unsafe fn create_instance(
    entry: &ash::Entry,
    app_name: &str,
    enable_validation: bool,
) -> Result<ash::Instance> {
    let app_name = CString::new(app_name)
        .map_err(|_| GpuError::InvalidState("Application name contains NUL".to_string()))?;

    let app_info = vk::ApplicationInfo::default()
        .application_name(&app_name)
        .application_version(vk::make_api_version(0, 0, 1, 0))
        .engine_name(c"Scenic")
        .engine_version(vk::make_api_version(0, 0, 1, 0))
        .api_version(vk::API_VERSION_1_3);

    let validation = c"VK_LAYER_KHRONOS_validation";
    let mut layer_names = Vec::new();
    if enable_validation {
        let available = entry.enumerate_instance_layer_properties()?;
        let found = available
            .iter()
            .any(|props| CStr::from_ptr(props.layer_name.as_ptr()) == validation);
        if found {
            layer_names.push(validation.as_ptr());
        } else {
            tracing::warn!("Validation layer {validation:?} not available");
        }
    }

    let create_info = vk::InstanceCreateInfo::default()
        .application_info(&app_info)
        .enabled_layer_names(&layer_names);

    Ok(entry.create_instance(&create_info, None)?)
}

/// Pick the highest scoring Vulkan 1.3 device with the indirect draw features.
unsafe fn select_physical_device(instance: &ash::Instance) -> Result<(vk::PhysicalDevice, String)> {
    let mut best = None;
    let mut best_score = 0i32;

    for device in instance.enumerate_physical_devices()? {
        let properties = instance.get_physical_device_properties(device);
        let features = instance.get_physical_device_features(device);

        let api = properties.api_version;
        if vk::api_version_major(api) == 1 && vk::api_version_minor(api) < 3 {
            continue;
        }
        if features.multi_draw_indirect != vk::TRUE
            || features.draw_indirect_first_instance != vk::TRUE
        {
            continue;
        }

        let score = match properties.device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => 1000,
            vk::PhysicalDeviceType::INTEGRATED_GPU => 100,
            vk::PhysicalDeviceType::VIRTUAL_GPU => 50,
            _ => 1,
        };
        if score > best_score {
            best_score = score;
            let name = CStr::from_ptr(properties.device_name.as_ptr())
                .to_string_lossy()
                .into_owned();
            best = Some((device, name));
        }
    }

    best.ok_or(GpuError::NoSuitableDevice)
}

unsafe fn create_device(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
) -> Result<(ash::Device, u32, vk::Queue)> {
    let graphics_family = instance
        .get_physical_device_queue_family_properties(physical_device)
        .iter()
        .position(|family| family.queue_flags.contains(vk::QueueFlags::GRAPHICS))
        .ok_or(GpuError::NoSuitableDevice)? as u32;

    let queue_priority = 1.0_f32;
    let queue_info = vk::DeviceQueueCreateInfo::default()
        .queue_family_index(graphics_family)
        .queue_priorities(std::slice::from_ref(&queue_priority));

    let mut vulkan_1_3_features = vk::PhysicalDeviceVulkan13Features::default()
        .dynamic_rendering(true)
        .synchronization2(true);
    let mut vulkan_1_2_features = vk::PhysicalDeviceVulkan12Features::default()
        .buffer_device_address(true)
        .scalar_block_layout(true);
    let features = vk::PhysicalDeviceFeatures::default()
        .multi_draw_indirect(true)
        .draw_indirect_first_instance(true)
        .shader_int64(true);

    let mut features2 = vk::PhysicalDeviceFeatures2::default()
        .features(features)
        .push_next(&mut vulkan_1_3_features)
        .push_next(&mut vulkan_1_2_features);

    let device_create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(std::slice::from_ref(&queue_info))
        .push_next(&mut features2);

    let device = instance.create_device(physical_device, &device_create_info, None)?;
    let graphics_queue = device.get_device_queue(graphics_family, 0);

    Ok((device, graphics_family, graphics_queue))
}
