/// DeviceManager - instance, surface, physical/logical device, queues and GPU allocator
///
/// Created once per renderer and shared by `Arc` with every object that
/// needs the device. It is destroyed when the last holder drops it.

use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use lumen_3d_engine::lumen3d::{Error, RendererConfig, Result};
use lumen_3d_engine::{engine_debug, engine_error, engine_info, engine_warn};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::ffi::{CStr, CString};
use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex};

use crate::vulkan_error::{vk_error, vk_init_error};

/// Device extensions every candidate GPU must expose
pub const REQUIRED_DEVICE_EXTENSIONS: [&CStr; 1] = [ash::khr::swapchain::NAME];

/// Queue family search result
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: Option<u32>,
    pub present: Option<u32>,
}

impl QueueFamilyIndices {
    pub fn is_complete(&self) -> bool {
        self.graphics.is_some() && self.present.is_some()
    }

    /// Resolved families, if both were found
    pub fn complete(&self) -> Option<QueueFamilies> {
        Some(QueueFamilies {
            graphics: self.graphics?,
            present: self.present?,
        })
    }
}

/// Graphics and present queue families of the selected device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilies {
    /// True when one family does both graphics and present
    pub fn is_shared(&self) -> bool {
        self.graphics == self.present
    }

    /// Distinct family indices (one queue is created per entry)
    pub fn unique(&self) -> Vec<u32> {
        if self.is_shared() {
            vec![self.graphics]
        } else {
            vec![self.graphics, self.present]
        }
    }
}

/// Surface capabilities, formats and present modes of a device
#[derive(Debug, Clone, Default)]
pub struct SwapchainSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupport {
    /// A swapchain can be built when at least one format and one mode exist
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// Find graphics and present queue families, stopping as soon as both are known
///
/// `supports_present(index)` reports whether the family can present to the surface.
pub fn find_queue_families(
    families: &[vk::QueueFamilyProperties],
    supports_present: impl Fn(u32) -> bool,
) -> QueueFamilyIndices {
    let mut indices = QueueFamilyIndices::default();

    for (index, family) in families.iter().enumerate() {
        let index = index as u32;
        if indices.graphics.is_none()
            && family.queue_count > 0
            && family.queue_flags.contains(vk::QueueFlags::GRAPHICS)
        {
            indices.graphics = Some(index);
        }
        if indices.present.is_none() && supports_present(index) {
            indices.present = Some(index);
        }
        if indices.is_complete() {
            break;
        }
    }

    indices
}

/// Names from `required` that do not appear in `available`
pub fn missing_names<'a>(
    available: impl IntoIterator<Item = &'a CStr>,
    required: &[&CStr],
) -> Vec<String> {
    let available: Vec<&CStr> = available.into_iter().collect();
    required
        .iter()
        .filter(|name| !available.contains(name))
        .map(|name| name.to_string_lossy().into_owned())
        .collect()
}

/// Objects created so far by `DeviceManager::new`
///
/// Destroys them in reverse creation order on drop, so a failed
/// initialization releases what it created. `release` hands them over.
#[derive(Default)]
struct InitGuard {
    instance: Option<ash::Instance>,
    #[cfg(feature = "vulkan-validation")]
    debug_messenger: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
    surface: Option<(ash::khr::surface::Instance, vk::SurfaceKHR)>,
    device: Option<ash::Device>,
}

impl InitGuard {
    fn release(&mut self) {
        self.device = None;
        self.surface = None;
        #[cfg(feature = "vulkan-validation")]
        {
            self.debug_messenger = None;
        }
        self.instance = None;
    }
}

impl Drop for InitGuard {
    fn drop(&mut self) {
        unsafe {
            if let Some(device) = self.device.take() {
                device.destroy_device(None);
            }
            if let Some((surface_loader, surface)) = self.surface.take() {
                surface_loader.destroy_surface(surface, None);
            }
            #[cfg(feature = "vulkan-validation")]
            if let Some((debug_utils, messenger)) = self.debug_messenger.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
                crate::vulkan_debug::cleanup_debug_config();
            }
            if let Some(instance) = self.instance.take() {
                engine_debug!("lumen3d::vulkan", "Releasing partially initialized Vulkan instance");
                instance.destroy_instance(None);
            }
        }
    }
}

pub struct DeviceManager {
    _entry: ash::Entry,
    instance: ash::Instance,
    #[cfg(feature = "vulkan-validation")]
    debug_messenger: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
    surface_loader: ash::khr::surface::Instance,
    surface: vk::SurfaceKHR,
    physical_device: vk::PhysicalDevice,
    device_name: String,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    queue_families: QueueFamilies,
    device: ash::Device,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    /// Dropped before the device in `Drop`
    allocator: ManuallyDrop<Arc<Mutex<Allocator>>>,
    validation_enabled: bool,
}

impl DeviceManager {
    /// Create the instance, surface, device and allocator for `window`
    ///
    /// Every failure here is `InitializationFailed` (fatal).
    pub fn new<W: HasDisplayHandle + HasWindowHandle>(
        window: &W,
        config: &RendererConfig,
    ) -> Result<Self> {
        let validation_enabled = config.enable_validation && cfg!(feature = "vulkan-validation");
        if config.enable_validation && !validation_enabled {
            engine_warn!("lumen3d::vulkan",
                "Validation requested but the backend was built without the vulkan-validation feature");
        }

        unsafe {
            let entry = ash::Entry::load().map_err(|e| {
                engine_error!("lumen3d::vulkan", "Failed to load Vulkan library: {:?}", e);
                Error::InitializationFailed(format!("Failed to load Vulkan library: {:?}", e))
            })?;

            let mut guard = InitGuard::default();
            let instance = guard
                .instance
                .insert(Self::create_instance(&entry, window, config, validation_enabled)?)
                .clone();

            #[cfg(feature = "vulkan-validation")]
            if validation_enabled {
                let debug_utils = ash::ext::debug_utils::Instance::new(&entry, &instance);
                crate::vulkan_debug::init_debug_config(
                    crate::vulkan_debug::Config::from_renderer_config(config),
                );
                let info = crate::vulkan_debug::messenger_create_info(config.debug_severity);
                let messenger = debug_utils
                    .create_debug_utils_messenger(&info, None)
                    .map_err(|e| vk_init_error("create debug messenger", e))?;
                guard.debug_messenger = Some((debug_utils, messenger));
            }

            let display_handle = window.display_handle().map_err(|e| {
                engine_error!("lumen3d::vulkan", "Failed to get display handle: {}", e);
                Error::InitializationFailed(format!("Failed to get display handle: {}", e))
            })?;
            let window_handle = window.window_handle().map_err(|e| {
                engine_error!("lumen3d::vulkan", "Failed to get window handle: {}", e);
                Error::InitializationFailed(format!("Failed to get window handle: {}", e))
            })?;
            let surface_loader = ash::khr::surface::Instance::new(&entry, &instance);
            let surface = ash_window::create_surface(
                &entry,
                &instance,
                display_handle.as_raw(),
                window_handle.as_raw(),
                None,
            )
            .map_err(|e| vk_init_error("create window surface", e))?;
            guard.surface = Some((surface_loader.clone(), surface));

            let (physical_device, queue_families) =
                Self::pick_physical_device(&instance, &surface_loader, surface)?;

            let properties = instance.get_physical_device_properties(physical_device);
            let device_name = properties
                .device_name_as_c_str()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|_| "Unknown GPU".to_string());
            engine_info!("lumen3d::vulkan", "Selected GPU: {}", device_name);

            let memory_properties = instance.get_physical_device_memory_properties(physical_device);

            let device = guard
                .device
                .insert(Self::create_logical_device(&instance, physical_device, queue_families)?)
                .clone();
            let graphics_queue = device.get_device_queue(queue_families.graphics, 0);
            let present_queue = device.get_device_queue(queue_families.present, 0);

            let allocator = Allocator::new(&AllocatorCreateDesc {
                instance: instance.clone(),
                device: device.clone(),
                physical_device,
                debug_settings: Default::default(),
                buffer_device_address: false,
                allocation_sizes: Default::default(),
            })
            .map_err(|e| {
                engine_error!("lumen3d::vulkan", "Failed to create GPU allocator: {:?}", e);
                Error::InitializationFailed(format!("Failed to create allocator: {:?}", e))
            })?;

            // Everything exists: ownership moves to the manager's Drop
            #[cfg(feature = "vulkan-validation")]
            let debug_messenger = guard.debug_messenger.take();
            guard.release();

            Ok(Self {
                _entry: entry,
                instance,
                #[cfg(feature = "vulkan-validation")]
                debug_messenger,
                surface_loader,
                surface,
                physical_device,
                device_name,
                memory_properties,
                queue_families,
                device,
                graphics_queue,
                present_queue,
                allocator: ManuallyDrop::new(Arc::new(Mutex::new(allocator))),
                validation_enabled,
            })
        }
    }

    unsafe fn create_instance<W: HasDisplayHandle>(
        entry: &ash::Entry,
        window: &W,
        config: &RendererConfig,
        validation_enabled: bool,
    ) -> Result<ash::Instance> {
        let app_name = CString::new(config.app_name.as_str()).map_err(|_| {
            Error::InitializationFailed("Application name contains a NUL byte".to_string())
        })?;
        let (major, minor, patch) = config.app_version;
        let app_info = vk::ApplicationInfo::default()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, major, minor, patch))
            .engine_name(c"Lumen3D")
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_0);

        let display_handle = window.display_handle().map_err(|e| {
            engine_error!("lumen3d::vulkan", "Failed to get display handle: {}", e);
            Error::InitializationFailed(format!("Failed to get display handle: {}", e))
        })?;
        let mut extension_names = ash_window::enumerate_required_extensions(display_handle.as_raw())
            .map_err(|e| vk_init_error("enumerate window-system extensions", e))?
            .to_vec();

        let mut layer_names: Vec<*const std::os::raw::c_char> = Vec::new();

        #[cfg(feature = "vulkan-validation")]
        if validation_enabled {
            let available = entry
                .enumerate_instance_layer_properties()
                .map_err(|e| vk_init_error("enumerate instance layers", e))?;
            let missing = missing_names(
                available.iter().filter_map(|layer| layer.layer_name_as_c_str().ok()),
                &[crate::vulkan_debug::VALIDATION_LAYER],
            );
            if !missing.is_empty() {
                engine_error!("lumen3d::vulkan", "Validation layers requested, but not available: {:?}", missing);
                return Err(Error::InitializationFailed(format!(
                    "Validation layers requested, but not available: {:?}",
                    missing
                )));
            }
            layer_names.push(crate::vulkan_debug::VALIDATION_LAYER.as_ptr());
            extension_names.push(ash::ext::debug_utils::NAME.as_ptr());
        }
        #[cfg(not(feature = "vulkan-validation"))]
        let _ = validation_enabled;

        let mut create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_layer_names(&layer_names)
            .enabled_extension_names(&extension_names);

        // Chained messenger covers vkCreateInstance/vkDestroyInstance themselves
        #[cfg(feature = "vulkan-validation")]
        let mut debug_info = crate::vulkan_debug::messenger_create_info(config.debug_severity);
        #[cfg(feature = "vulkan-validation")]
        if validation_enabled {
            create_info = create_info.push_next(&mut debug_info);
        }

        entry
            .create_instance(&create_info, None)
            .map_err(|e| vk_init_error("create Vulkan instance", e))
    }

    /// First device in enumeration order that has both queue families,
    /// the required extensions and a usable swapchain
    unsafe fn pick_physical_device(
        instance: &ash::Instance,
        surface_loader: &ash::khr::surface::Instance,
        surface: vk::SurfaceKHR,
    ) -> Result<(vk::PhysicalDevice, QueueFamilies)> {
        let physical_devices = instance
            .enumerate_physical_devices()
            .map_err(|e| vk_init_error("enumerate physical devices", e))?;

        if physical_devices.is_empty() {
            engine_error!("lumen3d::vulkan", "Failed to find GPUs with Vulkan support");
            return Err(Error::InitializationFailed(
                "Failed to find GPUs with Vulkan support".to_string(),
            ));
        }

        for physical_device in physical_devices {
            if let Some(families) =
                Self::check_device(instance, surface_loader, surface, physical_device)?
            {
                return Ok((physical_device, families));
            }
        }

        engine_error!("lumen3d::vulkan", "Failed to find a suitable GPU");
        Err(Error::InitializationFailed("Failed to find a suitable GPU".to_string()))
    }

    unsafe fn check_device(
        instance: &ash::Instance,
        surface_loader: &ash::khr::surface::Instance,
        surface: vk::SurfaceKHR,
        physical_device: vk::PhysicalDevice,
    ) -> Result<Option<QueueFamilies>> {
        let families = instance.get_physical_device_queue_family_properties(physical_device);
        let indices = find_queue_families(&families, |index| {
            surface_loader
                .get_physical_device_surface_support(physical_device, index, surface)
                .unwrap_or(false)
        });
        let Some(queue_families) = indices.complete() else {
            engine_debug!("lumen3d::vulkan", "Skipping GPU: missing graphics or present queue family");
            return Ok(None);
        };

        let extensions = instance
            .enumerate_device_extension_properties(physical_device)
            .map_err(|e| vk_init_error("enumerate device extensions", e))?;
        let missing = missing_names(
            extensions.iter().filter_map(|ext| ext.extension_name_as_c_str().ok()),
            &REQUIRED_DEVICE_EXTENSIONS,
        );
        if !missing.is_empty() {
            engine_debug!("lumen3d::vulkan", "Skipping GPU: missing extensions {:?}", missing);
            return Ok(None);
        }

        let support = query_swapchain_support(surface_loader, physical_device, surface)?;
        if !support.is_adequate() {
            engine_debug!("lumen3d::vulkan", "Skipping GPU: no surface formats or present modes");
            return Ok(None);
        }

        Ok(Some(queue_families))
    }

    unsafe fn create_logical_device(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        queue_families: QueueFamilies,
    ) -> Result<ash::Device> {
        let queue_priorities = [1.0];
        let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = queue_families
            .unique()
            .into_iter()
            .map(|family| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
            })
            .collect();

        let extension_names: Vec<*const std::os::raw::c_char> =
            REQUIRED_DEVICE_EXTENSIONS.iter().map(|name| name.as_ptr()).collect();

        let supported = instance.get_physical_device_features(physical_device);
        let features = vk::PhysicalDeviceFeatures::default()
            .sampler_anisotropy(supported.sampler_anisotropy == vk::TRUE);

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extension_names)
            .enabled_features(&features);

        instance
            .create_device(physical_device, &create_info, None)
            .map_err(|e| vk_init_error("create logical device", e))
    }

    pub fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    pub fn surface(&self) -> vk::SurfaceKHR {
        self.surface
    }

    pub fn surface_loader(&self) -> &ash::khr::surface::Instance {
        &self.surface_loader
    }

    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    pub fn queue_families(&self) -> QueueFamilies {
        self.queue_families
    }

    pub fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.memory_properties
    }

    pub fn allocator(&self) -> &Arc<Mutex<Allocator>> {
        &self.allocator
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn validation_enabled(&self) -> bool {
        self.validation_enabled
    }

    /// Format properties of the selected GPU
    pub fn format_properties(&self, format: vk::Format) -> vk::FormatProperties {
        unsafe {
            self.instance
                .get_physical_device_format_properties(self.physical_device, format)
        }
    }

    /// Current surface capabilities, formats and present modes
    pub fn query_swapchain_support(&self) -> Result<SwapchainSupport> {
        unsafe { query_swapchain_support(&self.surface_loader, self.physical_device, self.surface) }
    }

    /// Block until the GPU has finished all submitted work
    pub fn wait_idle(&self) -> Result<()> {
        unsafe {
            self.device
                .device_wait_idle()
                .map_err(|e| vk_error("wait for device idle", e))
        }
    }
}

unsafe fn query_swapchain_support(
    surface_loader: &ash::khr::surface::Instance,
    physical_device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
) -> Result<SwapchainSupport> {
    let capabilities = surface_loader
        .get_physical_device_surface_capabilities(physical_device, surface)
        .map_err(|e| vk_error("query surface capabilities", e))?;
    let formats = surface_loader
        .get_physical_device_surface_formats(physical_device, surface)
        .map_err(|e| vk_error("query surface formats", e))?;
    let present_modes = surface_loader
        .get_physical_device_surface_present_modes(physical_device, surface)
        .map_err(|e| vk_error("query present modes", e))?;

    Ok(SwapchainSupport {
        capabilities,
        formats,
        present_modes,
    })
}

impl Drop for DeviceManager {
    fn drop(&mut self) {
        unsafe {
            self.device.device_wait_idle().ok();

            // Allocator frees its memory blocks, so it must go while the device lives
            ManuallyDrop::drop(&mut self.allocator);

            #[cfg(feature = "vulkan-validation")]
            {
                crate::vulkan_debug::cleanup_debug_config();
                if let Some((debug_utils, messenger)) = self.debug_messenger.take() {
                    debug_utils.destroy_debug_utils_messenger(messenger, None);
                }
            }

            self.device.destroy_device(None);
            self.surface_loader.destroy_surface(self.surface, None);
            self.instance.destroy_instance(None);
        }
        engine_debug!("lumen3d::vulkan", "Device destroyed");
    }
}

#[cfg(test)]
#[path = "vulkan_device_tests.rs"]
mod tests;
