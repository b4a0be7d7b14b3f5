//! Two-pass plugin pipeline: load, then transform.

use std::path::Path;

use crate::build_map::{BuildMap, BuildOutput, file_extension};
use crate::error::PipelineError;
use crate::plugin::{
    LoadContext, LoadOutput, PluginError, ResolveSpec, SharedPlugin, TransformContext,
    TransformOutput,
};

/// What to do when a plugin hook fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Log the failure and keep the unmodified content (dev server).
    #[default]
    Continue,
    /// Abort the build of this file (one-shot build).
    FailFast,
}

/// Ordered list of plugins applied to a single source file.
#[derive(Debug)]
pub struct PluginPipeline {
    plugins: Vec<SharedPlugin>,
    policy: FailurePolicy,
}

impl PluginPipeline {
    /// Validate `plugins` and build a pipeline.
    ///
    /// Rejects plugins that declare `resolve` without `load` or the reverse,
    /// and extension lists that are empty or not of the form `.ext`.
    pub fn new(plugins: Vec<SharedPlugin>, policy: FailurePolicy) -> Result<Self, PipelineError> {
        for plugin in &plugins {
            validate_plugin(plugin)?;
        }
        Ok(Self { plugins, policy })
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    pub fn plugins(&self) -> &[SharedPlugin] {
        &self.plugins
    }

    /// Output extensions a source file with `extension` produces.
    pub fn output_extensions(&self, extension: &str) -> Vec<String> {
        self.extension_map().outputs_for(extension)
    }

    /// Snapshot of every plugin's input → output declaration.
    pub fn extension_map(&self) -> ExtensionMap {
        ExtensionMap {
            specs: self
                .plugins
                .iter()
                .filter_map(|plugin| plugin.resolve().cloned())
                .collect(),
        }
    }

    /// Run both passes over `path`.
    pub async fn build_file(&self, path: &Path) -> Result<BuildMap, PipelineError> {
        let extension = file_extension(path).unwrap_or_default();

        let mut map = match self.load(path, &extension).await? {
            Some(map) => map,
            None => {
                let code = tokio::fs::read(path)
                    .await
                    .map_err(|source| PipelineError::Read {
                        path: path.to_path_buf(),
                        source,
                    })?;
                BuildMap::single(extension.as_str(), code)
            }
        };

        self.transform(path, &mut map).await?;
        Ok(map)
    }

    async fn load(&self, path: &Path, extension: &str) -> Result<Option<BuildMap>, PipelineError> {
        let Some((plugin, spec)) = self.plugins.iter().find_map(|plugin| {
            plugin
                .resolve()
                .filter(|spec| spec.accepts(extension))
                .map(|spec| (plugin, spec))
        }) else {
            return Ok(None);
        };

        let ctx = LoadContext { path, extension };
        let output = match plugin.load(ctx).await {
            Ok(output) => output,
            Err(err) => {
                self.plugin_failed(plugin.name(), "load", path, err)?;
                return Ok(None);
            }
        };

        match output {
            LoadOutput::None => Ok(None),
            LoadOutput::Single(code) => {
                let key = spec.primary_output().unwrap_or(extension);
                Ok(Some(BuildMap::single(key, code)))
            }
            LoadOutput::Multi(map) => {
                if let Some(undeclared) = map.extensions().find(|ext| !spec.declares_output(ext)) {
                    return Err(PipelineError::UndeclaredOutput {
                        plugin: plugin.name().to_string(),
                        extension: undeclared.to_string(),
                        path: path.to_path_buf(),
                    });
                }
                Ok(Some(map))
            }
        }
    }

    async fn transform(&self, path: &Path, map: &mut BuildMap) -> Result<(), PipelineError> {
        for plugin in self.plugins.iter().filter(|p| p.has_transform()) {
            for (extension, output) in map.iter_mut() {
                let ctx = TransformContext {
                    path,
                    extension,
                    code: &output.code,
                };
                match plugin.transform(ctx).await {
                    Ok(TransformOutput::None) => {}
                    Ok(TransformOutput::Code(code)) => *output = BuildOutput::new(code),
                    Ok(TransformOutput::WithMap { code, map }) => {
                        *output = BuildOutput::with_map(code, map);
                    }
                    Err(err) => self.plugin_failed(plugin.name(), "transform", path, err)?,
                }
            }
        }
        Ok(())
    }

    fn plugin_failed(
        &self,
        plugin: &str,
        hook: &str,
        path: &Path,
        err: PluginError,
    ) -> Result<(), PipelineError> {
        tracing::error!(plugin, hook, path = %path.display(), error = %err, "plugin failed");
        match self.policy {
            FailurePolicy::Continue => Ok(()),
            FailurePolicy::FailFast => Err(PipelineError::PluginFailed {
                plugin: plugin.to_string(),
                path: path.to_path_buf(),
                source: err,
            }),
        }
    }
}

fn validate_plugin(plugin: &SharedPlugin) -> Result<(), PipelineError> {
    let invalid = |reason: &str| PipelineError::InvalidPlugin {
        plugin: plugin.name().to_string(),
        reason: reason.to_string(),
    };

    match (plugin.resolve(), plugin.has_load()) {
        (Some(_), false) => return Err(invalid("declares `resolve` without `load`")),
        (None, true) => return Err(invalid("declares `load` without `resolve`")),
        _ => {}
    }

    if let Some(spec) = plugin.resolve() {
        if spec.input.is_empty() {
            return Err(invalid("`resolve.input` is empty"));
        }
        if spec.output.is_empty() {
            return Err(invalid("`resolve.output` is empty"));
        }
        if let Some(bad) = spec
            .input
            .iter()
            .chain(&spec.output)
            .find(|ext| !is_valid_extension(ext))
        {
            return Err(invalid(&format!("`{bad}` is not an extension like `.js`")));
        }
    }

    Ok(())
}

fn is_valid_extension(ext: &str) -> bool {
    ext.len() > 1 && ext.starts_with('.') && !ext[1..].contains(['/', '\\'])
}

/// Source extension ↔ output extension relation declared by the plugins.
#[derive(Debug, Clone, Default)]
pub struct ExtensionMap {
    specs: Vec<ResolveSpec>,
}

impl ExtensionMap {
    pub fn from_specs(specs: impl IntoIterator<Item = ResolveSpec>) -> Self {
        Self {
            specs: specs.into_iter().collect(),
        }
    }

    /// Outputs produced from a source `extension`; the extension itself when no
    /// plugin loads it.
    pub fn outputs_for(&self, extension: &str) -> Vec<String> {
        self.specs
            .iter()
            .find(|spec| spec.accepts(extension))
            .map(|spec| spec.output.clone())
            .unwrap_or_else(|| vec![extension.to_string()])
    }

    /// The extension a source file is primarily served under.
    pub fn primary_output(&self, extension: &str) -> String {
        self.outputs_for(extension)
            .into_iter()
            .next()
            .unwrap_or_else(|| extension.to_string())
    }

    /// Source extensions that can produce `output`, in plugin order.
    pub fn inputs_for(&self, output: &str) -> Vec<String> {
        let mut inputs = Vec::new();
        for spec in self.specs.iter().filter(|s| s.declares_output(output)) {
            for input in &spec.input {
                if !inputs.contains(input) {
                    inputs.push(input.clone());
                }
            }
        }
        inputs
    }

    /// Every extension some plugin loads.
    pub fn source_extensions(&self) -> Vec<String> {
        let mut all = Vec::new();
        for input in self.specs.iter().flat_map(|s| &s.input) {
            if !all.contains(input) {
                all.push(input.clone());
            }
        }
        all
    }
}
