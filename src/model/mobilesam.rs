// 该文件是 Mobilesam Canvas 项目的一部分。
// src/model/mobilesam.rs - MobileSAM 编码器 / 解码器
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::sync::Mutex;

use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{FrameFormat, SamFrame, TensorLayout},
  model::{DEFAULT_CLICK_LABEL, DecoderInput, Embedding, MASK_INPUT_SIZE, MaskResult, Model},
  url_file_path,
};

const ENCODER_INPUT: &str = "input_image";
const ENCODER_OUTPUT: &str = "image_embeddings";
const DECODER_OUTPUT: &str = "masks";
const DEFAULT_THREADS: usize = 1;

#[derive(Error, Debug)]
pub enum OnnxModelError {
  #[error("模型加载错误: {0}")]
  ModelLoadError(#[from] std::io::Error),
  #[error("模型无效: {0}, 错误: {1}")]
  ModelInvalid(String, String),
  #[error("ONNX Runtime 错误: {0}")]
  OrtError(#[from] ort::Error),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
  #[error("模型缺少输出: {0}")]
  MissingOutput(&'static str),
  #[error("推理会话已失效")]
  SessionPoisoned,
}

impl OnnxModelError {
  pub fn invalid(msg: &str, e: impl std::fmt::Display) -> Self {
    OnnxModelError::ModelInvalid(msg.to_string(), e.to_string())
  }
}

/// `onnx:///path/model.onnx?threads=1&layout=nchw&label=0`
#[derive(Debug, Clone)]
pub struct OnnxModelBuilder {
  model_path: String,
  threads: usize,
  layout: TensorLayout,
  click_label: f32,
}

impl FromUrlWithScheme for OnnxModelBuilder {
  const SCHEME: &'static str = "onnx";
}

impl FromUrl for OnnxModelBuilder {
  type Error = OnnxModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(OnnxModelError::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    let mut builder = OnnxModelBuilder {
      model_path: url_file_path(url),
      threads: DEFAULT_THREADS,
      layout: TensorLayout::default(),
      click_label: DEFAULT_CLICK_LABEL,
    };

    for (k, v) in url.query_pairs() {
      match k.as_ref() {
        "threads" => {
          builder.threads = v
            .parse()
            .map_err(|_| OnnxModelError::ModelPathError(format!("无效的线程数: {}", v)))?;
        }
        "layout" => {
          builder.layout = v.parse().map_err(OnnxModelError::ModelPathError)?;
        }
        "label" => {
          builder.click_label = v
            .parse()
            .map_err(|_| OnnxModelError::ModelPathError(format!("无效的点标签: {}", v)))?;
        }
        other => debug!("忽略未知的模型参数: {}", other),
      }
    }

    Ok(builder)
  }
}

impl OnnxModelBuilder {
  pub fn layout(&self) -> TensorLayout {
    self.layout
  }

  pub fn click_label(&self) -> f32 {
    self.click_label
  }

  fn load_session(&self) -> Result<Session, OnnxModelError> {
    info!("加载模型文件: {}", self.model_path);
    let model_data = std::fs::read(&self.model_path)?;
    debug!(
      "模型文件大小: {:.2} MB",
      model_data.len() as f64 / (1024.0 * 1024.0)
    );

    info!("创建 ONNX 推理会话");
    let builder = Session::builder().map_err(|e| OnnxModelError::invalid("无法创建会话构建器", e))?;
    let builder = builder
      .with_optimization_level(GraphOptimizationLevel::Level3)
      .map_err(|e| OnnxModelError::invalid("无法设置优化级别", e))?;
    let builder = builder
      .with_intra_threads(self.threads)
      .map_err(|e| OnnxModelError::invalid("无法设置线程数", e))?;
    let session = builder
      .commit_from_memory(&model_data)
      .map_err(|e| OnnxModelError::invalid("无法加载模型", e))?;

    debug!(
      "模型输入: {:?}",
      session.inputs.iter().map(|i| i.name.as_str()).collect::<Vec<_>>()
    );
    debug!(
      "模型输出: {:?}",
      session.outputs.iter().map(|o| o.name.as_str()).collect::<Vec<_>>()
    );
    info!("模型加载完成");
    Ok(session)
  }

  pub fn build_encoder(self) -> Result<MobileSamEncoder, OnnxModelError> {
    let session = self.load_session()?;
    Ok(MobileSamEncoder {
      session: Mutex::new(session),
      layout: self.layout,
    })
  }

  pub fn build_decoder(self) -> Result<MobileSamDecoder, OnnxModelError> {
    let session = self.load_session()?;
    Ok(MobileSamDecoder {
      session: Mutex::new(session),
    })
  }
}

pub struct MobileSamEncoder {
  session: Mutex<Session>,
  layout: TensorLayout,
}

impl Model for MobileSamEncoder {
  type Input = SamFrame;
  type Output = Embedding;
  type Error = OnnxModelError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    if input.tensor_layout() != self.layout {
      return Err(OnnxModelError::invalid(
        "编码器输入排布不匹配",
        format!("期望 {:?}, 实际 {:?}", self.layout, input.tensor_layout()),
      ));
    }
    debug!("设置编码器输入: {:?}", input.tensor_shape());
    let image = Tensor::from_array((input.tensor_shape(), input.data().to_vec()))?;

    let mut session = self
      .session
      .lock()
      .map_err(|_| OnnxModelError::SessionPoisoned)?;
    debug!("执行编码器推理");
    let outputs = session.run(ort::inputs![ENCODER_INPUT => image])?;

    let value = outputs
      .get(ENCODER_OUTPUT)
      .ok_or(OnnxModelError::MissingOutput(ENCODER_OUTPUT))?;
    let (shape, data) = value.try_extract_tensor::<f32>()?;
    debug!("图像嵌入形状: {:?}", shape);

    Ok(Embedding::new(shape.to_vec(), data.to_vec()))
  }
}

pub struct MobileSamDecoder {
  session: Mutex<Session>,
}

impl Model for MobileSamDecoder {
  type Input = DecoderInput;
  type Output = MaskResult;
  type Error = OnnxModelError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    debug!("设置解码器输入: {:?}", input.prompt);
    let embedding = &input.embedding;
    let image_embeddings = Tensor::from_array((embedding.shape().to_vec(), embedding.data().to_vec()))?;
    let point_coords = Tensor::from_array(([1usize, 2, 2], input.prompt.coords.to_vec()))?;
    let point_labels = Tensor::from_array(([1usize, 2], input.prompt.labels.to_vec()))?;
    let mask_input = Tensor::from_array((
      [1usize, 1, MASK_INPUT_SIZE, MASK_INPUT_SIZE],
      input.mask_input(),
    ))?;
    let has_mask_input = Tensor::from_array(([1usize], input.has_mask_input().to_vec()))?;
    let orig_im_size = Tensor::from_array(([2usize], input.orig_im_size.to_vec()))?;

    let mut session = self
      .session
      .lock()
      .map_err(|_| OnnxModelError::SessionPoisoned)?;
    debug!("执行解码器推理");
    let outputs = session.run(ort::inputs![
      "image_embeddings" => image_embeddings,
      "point_coords" => point_coords,
      "point_labels" => point_labels,
      "mask_input" => mask_input,
      "has_mask_input" => has_mask_input,
      "orig_im_size" => orig_im_size
    ])?;

    let value = outputs
      .get(DECODER_OUTPUT)
      .ok_or(OnnxModelError::MissingOutput(DECODER_OUTPUT))?;
    let (shape, data) = value.try_extract_tensor::<f32>()?;
    debug!("掩码形状: {:?}", shape);

    Ok(MaskResult::new(shape.to_vec(), data.to_vec()))
  }
}
