//! Vulkan initialization and the shared device context
//!
//! Builds the instance, presentation surface, physical-device selection and
//! logical device, and exposes the process-wide handles (device, queues,
//! pools, pipeline cache) through one immutable [`DeviceContext`] that every
//! owning object receives at construction. Allocation out of the shared
//! pools happens only on the single frame-driver thread, so the context
//! carries no synchronization primitive.

#[cfg(debug_assertions)]
use ash::extensions::ext::DebugUtils;
use ash::extensions::khr::{Surface as SurfaceLoader, Swapchain as SwapchainLoader};
use ash::vk;
use ash::{Device, Entry, Instance};
use std::ffi::{CStr, CString};
use std::sync::Arc;
use thiserror::Error;

use crate::render::window::Window;

/// Vulkan-specific error types
#[derive(Error, Debug)]
pub enum VulkanError {
    /// General Vulkan API error with result code
    #[error("Vulkan API error: {0:?}")]
    Api(vk::Result),

    /// Vulkan context initialization failed
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// A bounded fence/acquire wait expired without the GPU finishing
    #[error("GPU wait timed out")]
    Timeout,

    /// No suitable memory type found for an allocation
    #[error("No suitable memory type found")]
    NoSuitableMemoryType,

    /// Invalid operation attempted
    #[error("Invalid operation: {reason}")]
    InvalidOperation {
        /// Description of why the operation is invalid
        reason: String,
    },
}

/// Result type for Vulkan operations
pub type VulkanResult<T> = Result<T, VulkanError>;

const DEVICE_EXTENSIONS: [&CStr; 1] = [SwapchainLoader::name()];

/// Vulkan instance wrapper with RAII cleanup
pub struct VulkanInstance {
    /// Vulkan entry point
    pub entry: Entry,
    /// Vulkan instance handle
    pub instance: Instance,
    #[cfg(debug_assertions)]
    debug_utils: Option<DebugUtils>,
    #[cfg(debug_assertions)]
    debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
}

impl VulkanInstance {
    /// Creates the instance with the extensions the windowing layer requires,
    /// plus validation layers and the debug messenger in debug builds.
    pub fn new(window: &Window, app_name: &str) -> VulkanResult<Self> {
        let entry = unsafe { Entry::load() }.map_err(|e| {
            VulkanError::InitializationFailed(format!("Failed to load Vulkan: {e:?}"))
        })?;

        let app_name_cstr = CString::new(app_name)
            .map_err(|_| VulkanError::InitializationFailed("Invalid app name".into()))?;
        let engine_name_cstr = CString::new("render_engine").unwrap();
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(&engine_name_cstr)
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_3);

        let required_extensions = window.required_instance_extensions().map_err(|e| {
            VulkanError::InitializationFailed(format!("Failed to get required extensions: {e}"))
        })?;
        let cstr_extensions: Vec<CString> = required_extensions
            .iter()
            .map(|ext| CString::new(ext.as_str()).unwrap())
            .collect();

        #[allow(unused_mut)]
        let mut extensions: Vec<*const i8> =
            cstr_extensions.iter().map(|ext| ext.as_ptr()).collect();
        #[cfg(debug_assertions)]
        extensions.push(DebugUtils::name().as_ptr());

        let layer_names: Vec<CString> = if cfg!(debug_assertions) {
            vec![CString::new("VK_LAYER_KHRONOS_validation").unwrap()]
        } else {
            vec![]
        };
        let layer_names_ptrs: Vec<*const i8> =
            layer_names.iter().map(|name| name.as_ptr()).collect();

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_names_ptrs);

        let instance = unsafe {
            entry
                .create_instance(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        #[cfg(debug_assertions)]
        let (debug_utils, debug_messenger) = {
            let debug_utils = DebugUtils::new(&entry, &instance);
            let messenger = Self::create_debug_messenger(&debug_utils)?;
            (Some(debug_utils), Some(messenger))
        };

        Ok(Self {
            entry,
            instance,
            #[cfg(debug_assertions)]
            debug_utils,
            #[cfg(debug_assertions)]
            debug_messenger,
        })
    }

    #[cfg(debug_assertions)]
    fn create_debug_messenger(
        debug_utils: &DebugUtils,
    ) -> VulkanResult<vk::DebugUtilsMessengerEXT> {
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        unsafe {
            debug_utils
                .create_debug_utils_messenger(&create_info, None)
                .map_err(VulkanError::Api)
        }
    }

    #[cfg(debug_assertions)]
    fn debug_utils_loader(&self) -> Option<DebugUtils> {
        self.debug_utils.clone()
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        unsafe {
            #[cfg(debug_assertions)]
            if let (Some(debug_utils), Some(messenger)) =
                (&self.debug_utils, &self.debug_messenger)
            {
                debug_utils.destroy_debug_utils_messenger(*messenger, None);
            }

            self.instance.destroy_instance(None);
        }
    }
}

/// Routes validation-layer messages into the logging channel.
#[cfg(debug_assertions)]
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let callback_data = *callback_data;
    let message = CStr::from_ptr(callback_data.p_message).to_string_lossy();

    if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        log::error!("[Vulkan] {message_type:?} - {message}");
    } else if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        log::warn!("[Vulkan] {message_type:?} - {message}");
    } else {
        log::debug!("[Vulkan] {message_type:?} - {message}");
    }

    vk::FALSE
}

/// Presentation surface wrapper with RAII cleanup
pub struct Surface {
    loader: SurfaceLoader,
    handle: vk::SurfaceKHR,
}

impl Surface {
    /// Creates the surface for the given window through the windowing layer.
    pub fn new(instance: &VulkanInstance, window: &mut Window) -> VulkanResult<Self> {
        let loader = SurfaceLoader::new(&instance.entry, &instance.instance);
        let handle = window
            .create_vulkan_surface(instance.instance.handle())
            .map_err(|e| VulkanError::InitializationFailed(format!("Surface creation: {e}")))?;

        Ok(Self { loader, handle })
    }

    /// Creates the surface for any window that exposes raw handles; entry
    /// point for applications embedding the engine in a non-GLFW window.
    pub fn from_raw_handles<W>(instance: &VulkanInstance, window: &W) -> VulkanResult<Self>
    where
        W: raw_window_handle::HasRawWindowHandle + raw_window_handle::HasRawDisplayHandle,
    {
        let loader = SurfaceLoader::new(&instance.entry, &instance.instance);
        let handle = unsafe {
            ash_window::create_surface(
                &instance.entry,
                &instance.instance,
                window.raw_display_handle(),
                window.raw_window_handle(),
                None,
            )
            .map_err(VulkanError::Api)?
        };

        Ok(Self { loader, handle })
    }

    /// Get the surface handle
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.handle
    }

    /// Get the surface extension loader
    pub fn loader(&self) -> &SurfaceLoader {
        &self.loader
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        unsafe {
            self.loader.destroy_surface(self.handle, None);
        }
    }
}

/// Physical device selection result and queue-family indices
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle
    pub device: vk::PhysicalDevice,
    /// Device properties and limits
    pub properties: vk::PhysicalDeviceProperties,
    /// Memory heaps and types of the device
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Index of the graphics queue family
    pub graphics_family: u32,
    /// Index of the compute queue family
    pub compute_family: u32,
    /// Index of the presentation queue family
    pub present_family: u32,
}

impl PhysicalDeviceInfo {
    /// Selects a physical device able to drive the frame pipeline.
    ///
    /// Prefers a device whose name contains `preferred_name`; falls back to
    /// the first suitable device. Suitability requires the swapchain
    /// extension, a presentable surface format, graphics/compute/present
    /// queue families and Vulkan 1.3.
    pub fn select(
        instance: &VulkanInstance,
        surface: &Surface,
        preferred_name: Option<&str>,
    ) -> VulkanResult<Self> {
        let devices = unsafe {
            instance
                .instance
                .enumerate_physical_devices()
                .map_err(VulkanError::Api)?
        };

        let mut fallback: Option<Self> = None;
        for device in devices {
            let Ok(info) = Self::evaluate_device(&instance.instance, device, surface) else {
                continue;
            };
            if let Some(preferred) = preferred_name {
                if info
                    .name()
                    .to_lowercase()
                    .contains(&preferred.to_lowercase())
                {
                    log::info!("Selected GPU (preferred): {}", info.name());
                    return Ok(info);
                }
            }
            if fallback.is_none() {
                fallback = Some(info);
            }
        }

        if let Some(info) = fallback {
            if let Some(preferred) = preferred_name {
                log::warn!(
                    "Preferred device '{preferred}' not found, using: {}",
                    info.name()
                );
            } else {
                log::info!("Selected GPU: {}", info.name());
            }
            return Ok(info);
        }

        Err(VulkanError::InitializationFailed(
            "No suitable GPU found".to_string(),
        ))
    }

    fn evaluate_device(
        instance: &Instance,
        device: vk::PhysicalDevice,
        surface: &Surface,
    ) -> VulkanResult<Self> {
        let properties = unsafe { instance.get_physical_device_properties(device) };
        let memory_properties =
            unsafe { instance.get_physical_device_memory_properties(device) };

        if vk::api_version_major(properties.api_version) != 1
            || vk::api_version_minor(properties.api_version) < 3
        {
            return Err(VulkanError::InitializationFailed(
                "Device does not support Vulkan 1.3".to_string(),
            ));
        }

        Self::check_extensions(instance, device)?;
        Self::check_swapchain_support(device, surface)?;

        let (graphics_family, compute_family, present_family) =
            Self::find_queue_families(instance, device, surface)?;

        Ok(Self {
            device,
            properties,
            memory_properties,
            graphics_family,
            compute_family,
            present_family,
        })
    }

    fn check_extensions(instance: &Instance, device: vk::PhysicalDevice) -> VulkanResult<()> {
        let extensions = unsafe {
            instance
                .enumerate_device_extension_properties(device)
                .map_err(VulkanError::Api)?
        };

        let all_supported = DEVICE_EXTENSIONS.iter().all(|required| {
            extensions.iter().any(|available| {
                let name = unsafe { CStr::from_ptr(available.extension_name.as_ptr()) };
                name == *required
            })
        });

        if all_supported {
            Ok(())
        } else {
            Err(VulkanError::InitializationFailed(
                "Required device extensions not supported".to_string(),
            ))
        }
    }

    fn check_swapchain_support(device: vk::PhysicalDevice, surface: &Surface) -> VulkanResult<()> {
        let formats = unsafe {
            surface
                .loader()
                .get_physical_device_surface_formats(device, surface.handle())
                .map_err(VulkanError::Api)?
        };
        let present_modes = unsafe {
            surface
                .loader()
                .get_physical_device_surface_present_modes(device, surface.handle())
                .map_err(VulkanError::Api)?
        };

        if formats.is_empty() || present_modes.is_empty() {
            return Err(VulkanError::InitializationFailed(
                "Surface has no formats or present modes".to_string(),
            ));
        }
        Ok(())
    }

    fn find_queue_families(
        instance: &Instance,
        device: vk::PhysicalDevice,
        surface: &Surface,
    ) -> VulkanResult<(u32, u32, u32)> {
        let families = unsafe { instance.get_physical_device_queue_family_properties(device) };

        let mut graphics = None;
        let mut compute = None;
        let mut present = None;

        for (index, family) in families.iter().enumerate() {
            let index = index as u32;

            if family.queue_flags.contains(vk::QueueFlags::GRAPHICS) && graphics.is_none() {
                graphics = Some(index);
            }
            if family.queue_flags.contains(vk::QueueFlags::COMPUTE) && compute.is_none() {
                compute = Some(index);
            }

            let present_support = unsafe {
                surface
                    .loader()
                    .get_physical_device_surface_support(device, index, surface.handle())
                    .map_err(VulkanError::Api)?
            };
            if present_support && present.is_none() {
                present = Some(index);
            }

            if graphics.is_some() && compute.is_some() && present.is_some() {
                break;
            }
        }

        match (graphics, compute, present) {
            (Some(g), Some(c), Some(p)) => Ok((g, c, p)),
            _ => Err(VulkanError::InitializationFailed(
                "Missing graphics, compute or present queue family".to_string(),
            )),
        }
    }

    /// Human-readable device name from the driver.
    pub fn name(&self) -> String {
        unsafe { CStr::from_ptr(self.properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned()
    }
}

const DESCRIPTOR_POOL_SIZE: u32 = 128;
const DESCRIPTOR_MAX_SETS: u32 = 64;

/// Immutable, process-wide GPU handles shared by every engine object.
///
/// Constructed once at renderer startup and passed around as
/// `Arc<DeviceContext>`; owning objects keep a reference so the device
/// outlives everything allocated from it.
pub struct DeviceContext {
    device: Device,
    swapchain_loader: SwapchainLoader,
    #[cfg(debug_assertions)]
    debug_utils: Option<DebugUtils>,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    graphics_queue: vk::Queue,
    compute_queue: vk::Queue,
    present_queue: vk::Queue,
    graphics_family: u32,
    present_family: u32,
    command_pool: vk::CommandPool,
    descriptor_pool: vk::DescriptorPool,
    pipeline_cache: vk::PipelineCache,
}

impl DeviceContext {
    /// Creates the logical device, queues, pools and pipeline cache.
    pub fn new(
        instance: &VulkanInstance,
        physical: &PhysicalDeviceInfo,
    ) -> VulkanResult<Arc<Self>> {
        let mut unique_families = vec![physical.graphics_family];
        for family in [physical.compute_family, physical.present_family] {
            if !unique_families.contains(&family) {
                unique_families.push(family);
            }
        }

        let queue_priority = [1.0f32];
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = unique_families
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priority)
                    .build()
            })
            .collect();

        let extension_ptrs: Vec<*const i8> =
            DEVICE_EXTENSIONS.iter().map(|ext| ext.as_ptr()).collect();

        let mut vulkan12_features =
            vk::PhysicalDeviceVulkan12Features::builder().timeline_semaphore(true);
        let mut vulkan13_features =
            vk::PhysicalDeviceVulkan13Features::builder().synchronization2(true);

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extension_ptrs)
            .push_next(&mut vulkan12_features)
            .push_next(&mut vulkan13_features);

        let device = unsafe {
            instance
                .instance
                .create_device(physical.device, &create_info, None)
                .map_err(VulkanError::Api)?
        };

        let graphics_queue = unsafe { device.get_device_queue(physical.graphics_family, 0) };
        let compute_queue = unsafe { device.get_device_queue(physical.compute_family, 0) };
        let present_queue = unsafe { device.get_device_queue(physical.present_family, 0) };

        let swapchain_loader = SwapchainLoader::new(&instance.instance, &device);

        let pool_info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(physical.graphics_family);
        let command_pool = unsafe {
            device
                .create_command_pool(&pool_info, None)
                .map_err(VulkanError::Api)?
        };

        let descriptor_pool = Self::create_descriptor_pool(&device)?;

        let cache_info = vk::PipelineCacheCreateInfo::builder();
        let pipeline_cache = unsafe {
            device
                .create_pipeline_cache(&cache_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Arc::new(Self {
            device,
            swapchain_loader,
            #[cfg(debug_assertions)]
            debug_utils: instance.debug_utils_loader(),
            memory_properties: physical.memory_properties,
            graphics_queue,
            compute_queue,
            present_queue,
            graphics_family: physical.graphics_family,
            present_family: physical.present_family,
            command_pool,
            descriptor_pool,
            pipeline_cache,
        }))
    }

    fn create_descriptor_pool(device: &Device) -> VulkanResult<vk::DescriptorPool> {
        let pool_sizes: Vec<vk::DescriptorPoolSize> = [
            vk::DescriptorType::SAMPLER,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            vk::DescriptorType::SAMPLED_IMAGE,
            vk::DescriptorType::STORAGE_IMAGE,
            vk::DescriptorType::UNIFORM_TEXEL_BUFFER,
            vk::DescriptorType::STORAGE_TEXEL_BUFFER,
            vk::DescriptorType::UNIFORM_BUFFER,
            vk::DescriptorType::STORAGE_BUFFER,
            vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
            vk::DescriptorType::STORAGE_BUFFER_DYNAMIC,
            vk::DescriptorType::INPUT_ATTACHMENT,
        ]
        .iter()
        .map(|&ty| vk::DescriptorPoolSize {
            ty,
            descriptor_count: DESCRIPTOR_POOL_SIZE,
        })
        .collect();

        let create_info = vk::DescriptorPoolCreateInfo::builder()
            .max_sets(DESCRIPTOR_MAX_SETS)
            .pool_sizes(&pool_sizes);

        unsafe {
            device
                .create_descriptor_pool(&create_info, None)
                .map_err(VulkanError::Api)
        }
    }

    /// Get the logical device
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Get the swapchain extension loader
    pub fn swapchain_loader(&self) -> &SwapchainLoader {
        &self.swapchain_loader
    }

    #[cfg(debug_assertions)]
    pub(crate) fn debug_utils(&self) -> Option<&DebugUtils> {
        self.debug_utils.as_ref()
    }

    /// Memory heaps and types of the selected physical device
    pub fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.memory_properties
    }

    /// Get the graphics queue
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    /// Get the compute queue
    pub fn compute_queue(&self) -> vk::Queue {
        self.compute_queue
    }

    /// Get the presentation queue
    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    /// Get the graphics queue family index
    pub fn graphics_family(&self) -> u32 {
        self.graphics_family
    }

    /// Get the presentation queue family index
    pub fn present_family(&self) -> u32 {
        self.present_family
    }

    /// Get the shared command pool
    pub fn command_pool(&self) -> vk::CommandPool {
        self.command_pool
    }

    /// Get the shared descriptor pool
    pub fn descriptor_pool(&self) -> vk::DescriptorPool {
        self.descriptor_pool
    }

    /// Get the shared pipeline cache
    pub fn pipeline_cache(&self) -> vk::PipelineCache {
        self.pipeline_cache
    }

    /// Blocks until all queues of the device finished executing.
    pub fn wait_idle(&self) -> VulkanResult<()> {
        unsafe { self.device.device_wait_idle().map_err(VulkanError::Api) }
    }
}

impl Drop for DeviceContext {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device.destroy_descriptor_pool(self.descriptor_pool, None);
            self.device.destroy_pipeline_cache(self.pipeline_cache, None);
            self.device.destroy_command_pool(self.command_pool, None);
            self.device.destroy_device(None);
        }
    }
}
