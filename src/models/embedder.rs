//! Visual embedding models: a general-purpose CLIP image encoder and a
//! person re-identification encoder for appearance matching. Both emit
//! L2-normalized vectors so similarity is a plain dot product.

use super::ModelError;
use image::{imageops::FilterType, DynamicImage, GenericImageView};
use ndarray::Array;
use ort::{inputs, Session, SessionBuilder};
use std::path::Path;

const CLIP_SIZE: u32 = 224;
const CLIP_MEAN: [f32; 3] = [0.481_454_66, 0.457_827_5, 0.408_210_73];
const CLIP_STD: [f32; 3] = [0.268_629_54, 0.261_302_58, 0.275_777_11];

const REID_WIDTH: u32 = 128;
const REID_HEIGHT: u32 = 256;
const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

pub struct ClipEmbedder {
    session: Session,
    input_name: String,
    output_name: String,
}

impl ClipEmbedder {
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let (session, input_name, output_name) = load_session(path)?;
        Ok(Self {
            session,
            input_name,
            output_name,
        })
    }

    pub fn embed(&self, img: &DynamicImage) -> Result<Vec<f32>, ModelError> {
        let input = preprocess(img, CLIP_SIZE, CLIP_SIZE, &CLIP_MEAN, &CLIP_STD);
        run_embedding(&self.session, &self.input_name, &self.output_name, input)
    }
}

pub struct ReidEmbedder {
    session: Session,
    input_name: String,
    output_name: String,
}

impl ReidEmbedder {
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let (session, input_name, output_name) = load_session(path)?;
        Ok(Self {
            session,
            input_name,
            output_name,
        })
    }

    pub fn embed(&self, img: &DynamicImage) -> Result<Vec<f32>, ModelError> {
        let input = preprocess(img, REID_WIDTH, REID_HEIGHT, &IMAGENET_MEAN, &IMAGENET_STD);
        run_embedding(&self.session, &self.input_name, &self.output_name, input)
    }
}

fn load_session(path: &Path) -> Result<(Session, String, String), ModelError> {
    if !path.is_file() {
        return Err(ModelError::FileNotFound(path.into()));
    }
    let session = SessionBuilder::new()?
        .with_parallel_execution(true)?
        .with_memory_pattern(true)?
        .with_model_from_file(path)?;
    let input_name = session.inputs[0].name.clone();
    let output_name = session.outputs[0].name.clone();
    Ok((session, input_name, output_name))
}

fn preprocess(
    img: &DynamicImage,
    width: u32,
    height: u32,
    mean: &[f32; 3],
    std: &[f32; 3],
) -> Array<f32, ndarray::Ix4> {
    let resized = img.resize_exact(width, height, FilterType::CatmullRom);
    let mut input = Array::zeros((1, 3, height as usize, width as usize));
    for pixel in resized.pixels() {
        let x = pixel.0 as usize;
        let y = pixel.1 as usize;
        let [r, g, b, _] = pixel.2 .0;
        input[[0, 0, y, x]] = ((r as f32) / 255. - mean[0]) / std[0];
        input[[0, 1, y, x]] = ((g as f32) / 255. - mean[1]) / std[1];
        input[[0, 2, y, x]] = ((b as f32) / 255. - mean[2]) / std[2];
    }
    input
}

fn run_embedding(
    session: &Session,
    input_name: &str,
    output_name: &str,
    input: Array<f32, ndarray::Ix4>,
) -> Result<Vec<f32>, ModelError> {
    let outputs = session.run(inputs![input_name => input.view()]?)?;
    let tensor = outputs[output_name].extract_tensor::<f32>()?;
    let vector: Vec<f32> = tensor.view().iter().copied().collect();
    Ok(l2_normalize(vector))
}

/// Scale a vector to unit length. The zero vector stays zero.
pub fn l2_normalize(mut v: Vec<f32>) -> Vec<f32> {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a <= f32::EPSILON || norm_b <= f32::EPSILON {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
