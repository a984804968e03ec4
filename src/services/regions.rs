//! Regional duplicate scan with static-background exclusion.
//!
//! Photos taken from a fixed camera position share large static regions
//! (walls, shelving, signage) that would drown object-level matching in
//! false positives. Each photo is cut into an N×N grid and each cell
//! embedded; a cell position where most photo pairs agree is declared static
//! and excluded entirely, and only the remaining cells can flag pairs.

use crate::config::RegionConfig;
use crate::core::container::EmbeddedImage;
use crate::models::embedder::cosine_similarity;
use crate::models::ModelService;
use crate::progress::{AuditPhase, CancelToken, ProgressSink};
use crate::services::pipeline::ImageDiagnostic;
use image::GenericImageView;
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegionError {
    #[error("operation cancelled")]
    Cancelled,
}

/// How photos are grouped before pairwise comparison.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum RegionGrouping {
    /// All photos in one group.
    #[default]
    Global,
    /// One group per worksheet.
    PerSheet,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegionMatch {
    /// 0-based (row, column) of the grid cell within both photos.
    pub cell: (u32, u32),
    pub earlier_image: usize,
    pub later_image: usize,
    pub similarity: f32,
    pub group: String,
}

pub struct RegionFilter {
    config: RegionConfig,
}

impl RegionFilter {
    pub fn new(config: RegionConfig) -> Self {
        Self { config }
    }

    pub fn run(
        &self,
        images: &[EmbeddedImage],
        diagnostics: &[ImageDiagnostic],
        grouping: RegionGrouping,
        models: &ModelService,
        cancel: &CancelToken,
        progress: &ProgressSink,
    ) -> Result<Vec<RegionMatch>, RegionError> {
        if !models.capabilities().clip_embedding {
            log::info!("region scan skipped: embedding capability missing");
            return Ok(Vec::new());
        }

        // Unique decodable photos, keyed into groups.
        let mut groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        let mut seen = std::collections::HashSet::new();
        for (i, image) in images.iter().enumerate() {
            if diagnostics
                .get(i)
                .is_some_and(|d| d.skipped_reason.is_some())
            {
                continue;
            }
            if !seen.insert(image.content_hash.clone()) {
                continue;
            }
            let key = match grouping {
                RegionGrouping::Global => "all".to_string(),
                RegionGrouping::PerSheet => image.sheet.clone(),
            };
            groups.entry(key).or_default().push(i);
        }

        let total: usize = groups.values().map(|g| g.len()).sum();
        let mut embedded = 0usize;
        let mut matches = Vec::new();
        for (group, members) in &groups {
            if members.len() < 2 {
                embedded += members.len();
                continue;
            }

            let mut cell_vectors = Vec::with_capacity(members.len());
            for &image_index in members {
                if cancel.is_cancelled() {
                    return Err(RegionError::Cancelled);
                }
                match self.embed_cells(&images[image_index], models) {
                    Some(cells) => cell_vectors.push((image_index, cells)),
                    None => log::warn!(
                        "photo {} dropped from region scan",
                        images[image_index].id
                    ),
                }
                embedded += 1;
                progress.send(
                    AuditPhase::RegionScan,
                    (embedded * 100 / total.max(1)) as u8,
                    format!("Scanned regions in {embedded} of {total} photos"),
                );
            }

            matches.extend(compare_group(&cell_vectors, group, &self.config));
        }
        Ok(matches)
    }

    /// One embedding per grid cell, row-major.
    fn embed_cells(&self, image: &EmbeddedImage, models: &ModelService) -> Option<Vec<Vec<f32>>> {
        let clip = models.clip()?;
        let decoded = match image::load_from_memory(&image.data) {
            Ok(d) => d,
            Err(e) => {
                log::warn!("photo {} failed to decode for region scan: {e}", image.id);
                return None;
            }
        };
        let grid = self.config.grid.max(1);
        let cell_w = decoded.width() / grid;
        let cell_h = decoded.height() / grid;
        if cell_w == 0 || cell_h == 0 {
            return None;
        }
        let mut cells = Vec::with_capacity((grid * grid) as usize);
        for row in 0..grid {
            for col in 0..grid {
                let crop = decoded.crop_imm(col * cell_w, row * cell_h, cell_w, cell_h);
                match clip.embed(&crop) {
                    Ok(vector) => cells.push(vector),
                    Err(e) => {
                        log::warn!("cell embedding failed on photo {}: {e}", image.id);
                        return None;
                    }
                }
            }
        }
        Some(cells)
    }
}

/// Pairwise comparison of one group's cell embeddings. A cell position is
/// static when at least `static_pair_ratio` of photo pairs clear the static
/// threshold there; static positions are excluded entirely, the rest flag
/// every pair at or above the duplicate threshold.
fn compare_group(
    photos: &[(usize, Vec<Vec<f32>>)],
    group: &str,
    cfg: &RegionConfig,
) -> Vec<RegionMatch> {
    let grid = cfg.grid.max(1);
    let cell_count = (grid * grid) as usize;
    let pair_count = photos.len() * photos.len().saturating_sub(1) / 2;
    if pair_count == 0 {
        return Vec::new();
    }

    let mut matches = Vec::new();
    for cell in 0..cell_count {
        let mut similarities = Vec::with_capacity(pair_count);
        for (i, (earlier_image, earlier_cells)) in photos.iter().enumerate() {
            for (later_image, later_cells) in &photos[i + 1..] {
                similarities.push((
                    *earlier_image,
                    *later_image,
                    cosine_similarity(&earlier_cells[cell], &later_cells[cell]),
                ));
            }
        }

        let static_pairs = similarities
            .iter()
            .filter(|(_, _, s)| *s >= cfg.static_threshold)
            .count();
        if static_pairs as f64 >= cfg.static_pair_ratio * pair_count as f64 {
            continue;
        }

        let (row, col) = (cell as u32 / grid, cell as u32 % grid);
        for (earlier_image, later_image, similarity) in similarities {
            if similarity >= cfg.duplicate_threshold {
                matches.push(RegionMatch {
                    cell: (row, col),
                    earlier_image,
                    later_image,
                    similarity,
                    group: group.to_string(),
                });
            }
        }
    }
    matches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::embedder::l2_normalize;

    fn unit_vector(seed: u64) -> Vec<f32> {
        let mut state = seed.wrapping_mul(0x9E37_79B9_7F4A_7C15).wrapping_add(1);
        let raw: Vec<f32> = (0..16)
            .map(|_| {
                state = state
                    .wrapping_mul(6_364_136_223_846_793_005)
                    .wrapping_add(1_442_695_040_888_963_407);
                ((state >> 40) as f32 / 8_388_608.0) - 1.0
            })
            .collect();
        l2_normalize(raw)
    }

    fn cfg() -> RegionConfig {
        RegionConfig {
            grid: 2,
            ..RegionConfig::default()
        }
    }

    /// Photos whose cell 0 is identical everywhere (fixed background) and
    /// whose other cells are unique, except photos 0 and 2 sharing cell 3.
    fn fixture() -> Vec<(usize, Vec<Vec<f32>>)> {
        let background = unit_vector(1);
        let shared = unit_vector(2);
        (0..4)
            .map(|photo| {
                let mut cells = vec![
                    background.clone(),
                    unit_vector(10 + photo),
                    unit_vector(20 + photo),
                    unit_vector(30 + photo),
                ];
                if photo == 0 || photo == 2 {
                    cells[3] = shared.clone();
                }
                (photo as usize, cells)
            })
            .collect()
    }

    #[test]
    fn fully_static_cells_are_always_excluded() {
        let matches = compare_group(&fixture(), "all", &cfg());
        assert!(matches.iter().all(|m| m.cell != (0, 0)));
    }

    #[test]
    fn shared_non_static_cells_are_flagged() {
        let matches = compare_group(&fixture(), "all", &cfg());
        let flagged: Vec<_> = matches.iter().filter(|m| m.cell == (1, 1)).collect();
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].earlier_image, 0);
        assert_eq!(flagged[0].later_image, 2);
        assert!(flagged[0].similarity > 0.99);
    }

    #[test]
    fn unique_cells_stay_quiet() {
        let matches = compare_group(&fixture(), "all", &cfg());
        assert!(matches.iter().all(|m| m.cell == (1, 1)));
    }

    #[test]
    fn single_photo_group_produces_nothing() {
        let photos = vec![(0usize, vec![unit_vector(1); 4])];
        assert!(compare_group(&photos, "all", &cfg()).is_empty());
    }

    #[test]
    fn static_ratio_boundary() {
        // Six photos with cell 0 identical in five: 10 of 15 pairs are
        // static (0.67, under the 0.7 bar), so the cell survives and flags
        // its pairs. Identical in all six, the cell is excluded.
        let mostly: Vec<(usize, Vec<Vec<f32>>)> = (0..6)
            .map(|p| {
                let v = if p < 5 { unit_vector(1) } else { unit_vector(99) };
                (p as usize, vec![v, unit_vector(200 + p), unit_vector(300 + p), unit_vector(400 + p)])
            })
            .collect();
        let matches = compare_group(&mostly, "all", &cfg());
        // 5 identical photos in cell 0 flag pairs but the cell is not static.
        assert!(matches.iter().any(|m| m.cell == (0, 0)));

        let all_static: Vec<(usize, Vec<Vec<f32>>)> = (0..6)
            .map(|p| {
                (p as usize, vec![unit_vector(1), unit_vector(200 + p), unit_vector(300 + p), unit_vector(400 + p)])
            })
            .collect();
        let matches = compare_group(&all_static, "all", &cfg());
        assert!(matches.iter().all(|m| m.cell != (0, 0)));
    }
}
