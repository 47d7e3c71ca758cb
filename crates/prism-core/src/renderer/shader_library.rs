// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The compiled shader library owned by the GPU context.
//!
//! Shader text is supplied by the application. Each [`ShaderVariant`] names one
//! module and the entry points a pass expects to find in it.

use crate::renderer::api::{ShaderModuleDescriptor, ShaderModuleId, ShaderSourceData};
use crate::renderer::error::ShaderError;
use crate::renderer::traits::GraphicsDevice;
use std::borrow::Cow;
use std::collections::BTreeMap;

/// The shader programs a frame can need.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShaderVariant {
    /// Depth-only rendering from the light's point of view.
    ShadowDepth,
    /// Opaque geometry into the G-buffer targets.
    GBuffer,
    /// Full-screen directional light accumulation.
    DeferredSun,
    /// Instanced point light volumes.
    DeferredPointLight,
    /// G-buffer fill writing into tile memory.
    TiledGBuffer,
    /// Directional lighting reading the G-buffer from tile memory.
    TiledSun,
    /// Point lights reading the G-buffer from tile memory.
    TiledPointLight,
    /// Forward shading with shadows.
    Forward,
    /// Forward shading reading per-draw data through the draw table.
    IndirectForward,
    /// The animated water surface.
    WaterSurface,
    /// Compute stage that writes indirect draw arguments.
    IndirectEncode,
}

impl ShaderVariant {
    /// Every variant, in declaration order.
    pub const ALL: [ShaderVariant; 11] = [
        ShaderVariant::ShadowDepth,
        ShaderVariant::GBuffer,
        ShaderVariant::DeferredSun,
        ShaderVariant::DeferredPointLight,
        ShaderVariant::TiledGBuffer,
        ShaderVariant::TiledSun,
        ShaderVariant::TiledPointLight,
        ShaderVariant::Forward,
        ShaderVariant::IndirectForward,
        ShaderVariant::WaterSurface,
        ShaderVariant::IndirectEncode,
    ];

    /// A stable name used for labels and logs.
    pub fn name(&self) -> &'static str {
        match self {
            ShaderVariant::ShadowDepth => "shadow_depth",
            ShaderVariant::GBuffer => "gbuffer",
            ShaderVariant::DeferredSun => "deferred_sun",
            ShaderVariant::DeferredPointLight => "deferred_point_light",
            ShaderVariant::TiledGBuffer => "tiled_gbuffer",
            ShaderVariant::TiledSun => "tiled_sun",
            ShaderVariant::TiledPointLight => "tiled_point_light",
            ShaderVariant::Forward => "forward",
            ShaderVariant::IndirectForward => "indirect_forward",
            ShaderVariant::WaterSurface => "water_surface",
            ShaderVariant::IndirectEncode => "indirect_encode",
        }
    }

    /// The vertex (or compute) entry point.
    pub fn primary_entry(&self) -> &'static str {
        match self {
            ShaderVariant::IndirectEncode => "cs_main",
            _ => "vs_main",
        }
    }

    /// The fragment entry point, `None` for depth-only and compute variants.
    pub fn fragment_entry(&self) -> Option<&'static str> {
        match self {
            ShaderVariant::ShadowDepth | ShaderVariant::IndirectEncode => None,
            _ => Some("fs_main"),
        }
    }

    /// Returns `true` for compute variants.
    pub fn is_compute(&self) -> bool {
        matches!(self, ShaderVariant::IndirectEncode)
    }
}

/// Shader sources keyed by variant, as handed to [`ShaderLibrary::compile`].
#[derive(Debug, Clone, Default)]
pub struct ShaderSources {
    sources: BTreeMap<ShaderVariant, Cow<'static, str>>,
}

impl ShaderSources {
    /// Creates an empty source set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the WGSL text for a variant, replacing any previous text.
    pub fn with(mut self, variant: ShaderVariant, source: impl Into<Cow<'static, str>>) -> Self {
        self.sources.insert(variant, source.into());
        self
    }

    /// Registers the WGSL text for a variant in place.
    pub fn insert(&mut self, variant: ShaderVariant, source: impl Into<Cow<'static, str>>) {
        self.sources.insert(variant, source.into());
    }

    /// Returns `true` if no source was registered.
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

/// A compiled module together with its entry points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompiledShader {
    /// The module id.
    pub module: ShaderModuleId,
    /// The vertex or compute entry point.
    pub primary_entry: &'static str,
    /// The fragment entry point, if any.
    pub fragment_entry: Option<&'static str>,
}

/// Every shader module compiled at startup.
#[derive(Debug, Default)]
pub struct ShaderLibrary {
    modules: BTreeMap<ShaderVariant, CompiledShader>,
}

impl ShaderLibrary {
    /// Compiles every registered source.
    ///
    /// ## Errors
    /// Returns the first compilation error. Shader failures are fatal, so no
    /// partially compiled library is ever returned.
    pub fn compile(
        device: &dyn GraphicsDevice,
        sources: &ShaderSources,
    ) -> Result<Self, ShaderError> {
        let mut modules = BTreeMap::new();
        for (variant, source) in &sources.sources {
            let module = device
                .create_shader_module(&ShaderModuleDescriptor {
                    label: Some(variant.name()),
                    source: ShaderSourceData::Wgsl(Cow::Borrowed(source.as_ref())),
                })
                .map_err(|e| ShaderError::CompilationError {
                    label: variant.name().to_string(),
                    details: e.to_string(),
                })?;
            log::debug!("Compiled shader variant '{}'", variant.name());
            modules.insert(
                *variant,
                CompiledShader {
                    module,
                    primary_entry: variant.primary_entry(),
                    fragment_entry: variant.fragment_entry(),
                },
            );
        }
        log::info!("Shader library ready with {} modules", modules.len());
        Ok(Self { modules })
    }

    /// Looks up a compiled variant.
    ///
    /// ## Errors
    /// * `ShaderError::MissingVariant` - If no source was supplied for it.
    pub fn get(&self, variant: ShaderVariant) -> Result<CompiledShader, ShaderError> {
        self.modules
            .get(&variant)
            .copied()
            .ok_or_else(|| ShaderError::MissingVariant {
                variant: variant.name().to_string(),
            })
    }

    /// Returns `true` if the variant was compiled.
    pub fn contains(&self, variant: ShaderVariant) -> bool {
        self.modules.contains_key(&variant)
    }

    /// Number of compiled modules.
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Returns `true` if nothing was compiled.
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_only_variants_have_no_fragment_stage() {
        assert_eq!(ShaderVariant::ShadowDepth.fragment_entry(), None);
        assert_eq!(ShaderVariant::IndirectEncode.primary_entry(), "cs_main");
        assert!(ShaderVariant::IndirectEncode.is_compute());
        assert_eq!(ShaderVariant::Forward.fragment_entry(), Some("fs_main"));
    }

    #[test]
    fn variant_names_are_unique() {
        let mut names: Vec<_> = ShaderVariant::ALL.iter().map(|v| v.name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), ShaderVariant::ALL.len());
    }

    #[test]
    fn missing_variant_is_reported() {
        let library = ShaderLibrary::default();
        let err = library.get(ShaderVariant::Forward).unwrap_err();
        assert!(matches!(err, ShaderError::MissingVariant { .. }));
    }
}
