//! Shader module loading.
//!
//! Shaders ship as precompiled SPIR-V; each file is read fully into memory
//! at startup and wrapped in a `vk::ShaderModule`. There is no runtime
//! compilation.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// A compiled shader module.
pub struct Shader {
    device: Arc<Device>,
    module: vk::ShaderModule,
}

impl Shader {
    /// Reads a SPIR-V file and creates the module.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::ShaderError`] when the file cannot be read or is
    /// not valid SPIR-V (wrong size/alignment), and a Vulkan error when
    /// module creation fails.
    pub fn from_spirv_file(device: Arc<Device>, path: &Path) -> RhiResult<Self> {
        let mut file = File::open(path).map_err(|e| {
            RhiError::ShaderError(format!("couldn't open {}: {e}", path.display()))
        })?;

        let code = ash::util::read_spv(&mut file).map_err(|e| {
            RhiError::ShaderError(format!("couldn't read SPIR-V from {}: {e}", path.display()))
        })?;

        let create_info = vk::ShaderModuleCreateInfo::default().code(&code);

        // SAFETY: create_info references live within this scope.
        let module = unsafe { device.handle().create_shader_module(&create_info, None)? };

        debug!("Created shader module from {}", path.display());
        Ok(Self { device, module })
    }

    /// Returns the Vulkan shader module handle.
    #[inline]
    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }
}

impl Drop for Shader {
    fn drop(&mut self) {
        // SAFETY: pipelines created from the module keep their own copy of
        // the code; destroying the module after pipeline creation is fine.
        unsafe {
            self.device.handle().destroy_shader_module(self.module, None);
        }
        debug!("Destroyed shader module");
    }
}
