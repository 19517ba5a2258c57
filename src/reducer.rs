//! # Size Reduction Module
//!
//! Questo modulo ricomprime le immagini che superano il byte budget prima dell'upload.
//!
//! ## Politica:
//! - **Sotto budget**: il file passa invariato, byte per byte (nessuna perdita di qualità)
//! - **Sopra budget**: decode, lato lungo limitato a `max_long_edge` mantenendo
//!   l'aspect ratio, encode JPEG baseline con qualità fissa
//! - **Mai più grande**: se il risultato non è strettamente più piccolo si tengono
//!   i bytes originali
//! - **Fallback**: qualsiasi errore interno (file corrotto, formato non supportato,
//!   memoria) restituisce i bytes originali. La compressione è un'ottimizzazione,
//!   non un requisito di correttezza.
//!
//! ## Concorrenza:
//! Decode e encode sono CPU-bound: girano su `tokio::task::spawn_blocking` così
//! la progress bar e il segnale di stop restano reattivi.

use crate::config::Config;
use crate::error::{IngestError, Result};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::ColorType;
use std::sync::Arc;
use tracing::{debug, warn};

/// Mime type prodotto da ogni ricompressione
pub const REENCODED_MIME: &str = "image/jpeg";

/// Cosa è successo ai bytes di un file
#[derive(Debug, Clone, PartialEq)]
pub enum ReductionOutcome {
    /// Sotto budget, nessuna ricompressione tentata
    Passthrough,
    /// Ricompresso in JPEG con le dimensioni finali
    Reencoded { width: u32, height: u32 },
    /// Ricompressione fallita o inutile, bytes originali
    Fallback(String),
}

/// Output of the reducer: the bytes to upload and how they were obtained
#[derive(Debug, Clone)]
pub struct Reduction {
    pub bytes: Vec<u8>,
    pub outcome: ReductionOutcome,
}

impl Reduction {
    pub fn is_reencoded(&self) -> bool {
        matches!(self.outcome, ReductionOutcome::Reencoded { .. })
    }
}

/// Riduttore condizionale configurato con budget, lato massimo e qualità
#[derive(Debug, Clone)]
pub struct SizeReducer {
    byte_budget: u64,
    max_long_edge: u32,
    quality: u8,
}

impl SizeReducer {
    pub fn new(byte_budget: u64, max_long_edge: u32, quality: u8) -> Self {
        Self {
            byte_budget,
            max_long_edge,
            quality: quality.clamp(1, 100),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.byte_budget, config.max_long_edge, config.jpeg_quality)
    }

    /// True se il file supera il budget e verrà ricompresso
    pub fn needs_reduction(&self, size: u64) -> bool {
        size > self.byte_budget
    }

    /// Reduce `bytes` if they exceed the byte budget.
    ///
    /// The CPU work is handed to the blocking pool. The returned bytes are never
    /// larger than the input.
    pub async fn reduce(&self, bytes: Vec<u8>) -> Reduction {
        if !self.needs_reduction(bytes.len() as u64) {
            return Reduction {
                bytes,
                outcome: ReductionOutcome::Passthrough,
            };
        }

        let original = Arc::new(bytes);
        let worker_input = Arc::clone(&original);
        let reducer = self.clone();

        let result = tokio::task::spawn_blocking(move || reducer.reencode(&worker_input)).await;

        let reason = match result {
            Ok(Ok((encoded, width, height))) => {
                if encoded.len() < original.len() {
                    debug!(
                        "Re-encoded {} -> {} bytes ({}x{})",
                        original.len(),
                        encoded.len(),
                        width,
                        height
                    );
                    return Reduction {
                        bytes: encoded,
                        outcome: ReductionOutcome::Reencoded { width, height },
                    };
                }
                format!(
                    "re-encoded output ({} bytes) not smaller than original ({} bytes)",
                    encoded.len(),
                    original.len()
                )
            }
            Ok(Err(e)) => e.to_string(),
            Err(e) => format!("compression worker failed: {}", e),
        };

        warn!("⚠️ Keeping original bytes: {}", reason);
        let bytes = Arc::try_unwrap(original).unwrap_or_else(|shared| shared.as_ref().clone());
        Reduction {
            bytes,
            outcome: ReductionOutcome::Fallback(reason),
        }
    }

    /// Decode, cap del lato lungo, encode JPEG. Bloccante.
    pub fn reencode(&self, bytes: &[u8]) -> Result<(Vec<u8>, u32, u32)> {
        let img = image::load_from_memory(bytes)?;

        let long_edge = img.width().max(img.height());
        let img = if long_edge > self.max_long_edge {
            img.resize(self.max_long_edge, self.max_long_edge, FilterType::Lanczos3)
        } else {
            img
        };

        // JPEG non supporta il canale alpha
        let rgb = img.to_rgb8();
        let (width, height) = rgb.dimensions();
        if width == 0 || height == 0 {
            return Err(IngestError::Validation("decoded image has no pixels".to_string()));
        }

        let mut encoded = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut encoded, self.quality);
        encoder.encode(rgb.as_raw(), width, height, ColorType::Rgb8)?;

        Ok((encoded, width, height))
    }
}
