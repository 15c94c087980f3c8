// SPDX-License-Identifier: CEPL-1.0
//! SPIR-V loading, `VK_EXT_shader_object` shaders and pipeline layouts.

use crate::context::Context;
use crate::error::{GpuError, Result};
use ash::vk;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::debug;

const ENTRY_POINT: &std::ffi::CStr = c"main";

/// Reads a compiled SPIR-V module verbatim.
pub fn read_shader(path: impl AsRef<Path>) -> Result<Vec<u32>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| GpuError::ShaderFileNotFound {
        path: path.to_path_buf(),
        source,
    })?;
    let words = ash::util::read_spv(&mut BufReader::new(file)).map_err(|_| {
        GpuError::ShaderFileInvalid {
            path: path.to_path_buf(),
        }
    })?;
    if words.is_empty() {
        return Err(GpuError::ShaderFileInvalid {
            path: path.to_path_buf(),
        });
    }
    Ok(words)
}

#[derive(Debug, Clone)]
pub struct ShaderConfig {
    pub path: PathBuf,
    pub stage: vk::ShaderStageFlags,
    pub next_stage: vk::ShaderStageFlags,
    pub set_layouts: Vec<vk::DescriptorSetLayout>,
    pub push_ranges: Vec<vk::PushConstantRange>,
    pub flags: vk::ShaderCreateFlagsEXT,
}

impl ShaderConfig {
    pub fn new(path: impl Into<PathBuf>, stage: vk::ShaderStageFlags) -> Self {
        ShaderConfig {
            path: path.into(),
            stage,
            next_stage: vk::ShaderStageFlags::empty(),
            set_layouts: Vec::new(),
            push_ranges: Vec::new(),
            flags: vk::ShaderCreateFlagsEXT::empty(),
        }
    }

    fn create_info<'a>(
        &'a self,
        code: &'a [u32],
        extra_flags: vk::ShaderCreateFlagsEXT,
    ) -> vk::ShaderCreateInfoEXT<'a> {
        assert!(!self.stage.is_empty(), "shader stage is empty");
        vk::ShaderCreateInfoEXT::default()
            .flags(self.flags | extra_flags)
            .stage(self.stage)
            .next_stage(self.next_stage)
            .code_type(vk::ShaderCodeTypeEXT::SPIRV)
            .code(bytemuck::cast_slice(code))
            .name(ENTRY_POINT)
            .set_layouts(&self.set_layouts)
            .push_constant_ranges(&self.push_ranges)
    }
}

pub struct ShaderObject<'ctx> {
    ctx: &'ctx Context,
    shader: vk::ShaderEXT,
    stage: vk::ShaderStageFlags,
}

impl<'ctx> ShaderObject<'ctx> {
    /// A single shader that can be bound with any compatible neighbour.
    pub fn create_unlinked(ctx: &'ctx Context, config: &ShaderConfig) -> Result<Self> {
        let code = read_shader(&config.path)?;
        let info = config.create_info(&code, vk::ShaderCreateFlagsEXT::empty());
        let mut shaders = create_shaders(ctx, std::slice::from_ref(&info))?;
        debug!("shader {:?} from {}", config.stage, config.path.display());
        Ok(ShaderObject {
            ctx,
            shader: shaders.remove(0),
            stage: config.stage,
        })
    }

    /// Shaders compiled together with `LINK_STAGE`; they must be bound
    /// together. Returned in the order of `configs`.
    pub fn create_linked(ctx: &'ctx Context, configs: &[ShaderConfig]) -> Result<Vec<Self>> {
        assert!(configs.len() >= 2, "linking needs at least two stages");
        let codes = configs
            .iter()
            .map(|config| read_shader(&config.path))
            .collect::<Result<Vec<_>>>()?;
        let infos: Vec<_> = configs
            .iter()
            .zip(&codes)
            .map(|(config, code)| config.create_info(code, vk::ShaderCreateFlagsEXT::LINK_STAGE))
            .collect();
        let shaders = create_shaders(ctx, &infos)?;
        debug!("{} linked shaders", shaders.len());
        Ok(configs
            .iter()
            .zip(shaders)
            .map(|(config, shader)| ShaderObject {
                ctx,
                shader,
                stage: config.stage,
            })
            .collect())
    }

    pub fn raw(&self) -> vk::ShaderEXT {
        self.shader
    }

    pub fn stage(&self) -> vk::ShaderStageFlags {
        self.stage
    }
}

impl Drop for ShaderObject<'_> {
    fn drop(&mut self) {
        // SAFETY: owned handle, unbound by the time it drops.
        unsafe { self.ctx.shader_object().destroy_shader(self.shader, None) };
    }
}

fn create_shaders(
    ctx: &Context,
    infos: &[vk::ShaderCreateInfoEXT<'_>],
) -> Result<Vec<vk::ShaderEXT>> {
    let loader = ctx.shader_object();
    // SAFETY: the infos borrow code and layouts that outlive the call.
    match unsafe { loader.create_shaders(infos, None) } {
        Ok(shaders) => Ok(shaders),
        Err((partial, e)) => {
            for shader in partial {
                if shader != vk::ShaderEXT::null() {
                    // SAFETY: created above and never used.
                    unsafe { loader.destroy_shader(shader, None) };
                }
            }
            Err(GpuError::CreateShader(e))
        }
    }
}

/// Binds each shader to its own stage.
pub fn bind_shaders(ctx: &Context, cmd: vk::CommandBuffer, shaders: &[&ShaderObject<'_>]) {
    let stages: Vec<_> = shaders.iter().map(|s| s.stage).collect();
    let handles: Vec<_> = shaders.iter().map(|s| s.shader).collect();
    // SAFETY: cmd is recording and the shaders outlive its execution.
    unsafe {
        ctx.shader_object()
            .cmd_bind_shaders(cmd, &stages, &handles)
    };
}

pub struct PipelineLayout<'ctx> {
    ctx: &'ctx Context,
    layout: vk::PipelineLayout,
}

impl<'ctx> PipelineLayout<'ctx> {
    pub fn create(
        ctx: &'ctx Context,
        set_layouts: &[vk::DescriptorSetLayout],
        push_ranges: &[vk::PushConstantRange],
    ) -> Result<Self> {
        let info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(set_layouts)
            .push_constant_ranges(push_ranges);
        // SAFETY: the slices outlive the call.
        let layout = unsafe { ctx.device().create_pipeline_layout(&info, None) }
            .map_err(GpuError::CreatePipelineLayout)?;
        Ok(PipelineLayout { ctx, layout })
    }

    pub fn raw(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for PipelineLayout<'_> {
    fn drop(&mut self) {
        // SAFETY: owned handle.
        unsafe { self.ctx.device().destroy_pipeline_layout(self.layout, None) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch(name: &str, bytes: &[u8]) -> PathBuf {
        let path = std::env::temp_dir().join(format!("vielle-{}-{name}", std::process::id()));
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn missing_file_is_not_found() {
        let err = read_shader("no/such/shader.spv").unwrap_err();
        assert!(matches!(err, GpuError::ShaderFileNotFound { .. }));
    }

    #[test]
    fn empty_file_is_invalid() {
        let path = scratch("empty.spv", &[]);
        let err = read_shader(&path).unwrap_err();
        std::fs::remove_file(&path).ok();
        assert!(matches!(err, GpuError::ShaderFileInvalid { .. }));
    }

    #[test]
    fn truncated_word_is_invalid() {
        let path = scratch("odd.spv", &[0x03, 0x02, 0x23]);
        let err = read_shader(&path).unwrap_err();
        std::fs::remove_file(&path).ok();
        assert!(matches!(err, GpuError::ShaderFileInvalid { .. }));
    }

    #[test]
    fn words_read_verbatim() {
        let words: [u32; 3] = [0x0723_0203, 0x0001_0000, 42];
        let path = scratch("words.spv", bytemuck::cast_slice(&words));
        let read = read_shader(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(read, words);
    }

    #[test]
    fn linked_info_carries_link_flag_and_entry_point() {
        let config = ShaderConfig {
            next_stage: vk::ShaderStageFlags::FRAGMENT,
            ..ShaderConfig::new("scene.vert.spv", vk::ShaderStageFlags::VERTEX)
        };
        let code = [0x0723_0203_u32];
        let info = config.create_info(&code, vk::ShaderCreateFlagsEXT::LINK_STAGE);
        assert!(info.flags.contains(vk::ShaderCreateFlagsEXT::LINK_STAGE));
        assert_eq!(info.code_size, 4);
        assert_eq!(info.next_stage, vk::ShaderStageFlags::FRAGMENT);
        assert_eq!(info.p_name, ENTRY_POINT.as_ptr());
    }
}
