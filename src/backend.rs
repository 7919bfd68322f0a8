use std::fs::File;
use std::path::Path;

use anyhow::{bail, Context, Result};
use candle_core::quantized::gguf_file;
use candle_core::{Device, Tensor};
use candle_transformers::models::{quantized_llama, quantized_qwen2};
use tracing::{debug, warn};

use crate::prompting::ModelFamily;

/// Quantized weights for one of the supported GGUF layouts.
pub enum RuntimeModel {
    Llama(quantized_llama::ModelWeights),
    Qwen2(quantized_qwen2::ModelWeights),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layout {
    Llama,
    Qwen2,
}

/// `general.architecture` decides when present; the configured family is
/// only a fallback for files that do not say.
fn pick_layout(declared: Option<&str>, family: ModelFamily) -> Result<Layout> {
    match declared {
        Some("llama") | Some("mistral") => return Ok(Layout::Llama),
        Some("qwen2") => return Ok(Layout::Qwen2),
        Some(other) => warn!(arch = other, "unrecognised GGUF architecture, using the configured family"),
        None => {}
    }

    match family {
        // Mistral exports share the llama tensor layout.
        ModelFamily::Llama | ModelFamily::Mistral => Ok(Layout::Llama),
        ModelFamily::Qwen => Ok(Layout::Qwen2),
        ModelFamily::Unknown => bail!("cannot tell the model architecture; pass --family explicitly"),
    }
}

impl RuntimeModel {
    pub fn load_from_gguf(path: &Path, family: ModelFamily, device: &Device) -> Result<Self> {
        let mut file =
            File::open(path).with_context(|| format!("failed to open model file {}", path.display()))?;
        let content = gguf_file::Content::read(&mut file)
            .with_context(|| format!("{} is not a GGUF file", path.display()))?;

        let declared = content
            .metadata
            .get("general.architecture")
            .and_then(|v| v.to_string().ok())
            .cloned();
        if let Some(arch) = &declared {
            let trained = content
                .metadata
                .get(&format!("{}.context_length", arch))
                .and_then(|v| v.to_u32().ok());
            debug!(arch = %arch, n_ctx_train = ?trained, tensors = content.tensor_infos.len(), "gguf header");
        }

        match pick_layout(declared.as_deref(), family)? {
            Layout::Llama => Ok(Self::Llama(quantized_llama::ModelWeights::from_gguf(
                content, &mut file, device,
            )?)),
            Layout::Qwen2 => quantized_qwen2::ModelWeights::from_gguf(content, &mut file, device)
                .map(Self::Qwen2)
                .map_err(|e| {
                    if e.to_string().contains("output_norm.weight") {
                        anyhow::anyhow!(
                            "qwen2 weights are missing output_norm.weight; the GGUF looks like one shard of a split export"
                        )
                    } else {
                        e.into()
                    }
                }),
        }
    }

    /// Logits for the last position of `input`.
    pub fn forward(&mut self, input: &Tensor, position: usize) -> Result<Tensor> {
        let logits = match self {
            Self::Llama(model) => model.forward(input, position)?,
            Self::Qwen2(model) => model.forward(input, position)?,
        };
        Ok(logits)
    }

    pub fn architecture(&self) -> &'static str {
        match self {
            Self::Llama(_) => "llama",
            Self::Qwen2(_) => "qwen2",
        }
    }
}
