// 该文件是 Facelite （轻量人脸推理） 项目的一部分。
// src/model.rs - 模型族与识别结果
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

use crate::{
  engine::{EngineError, OutputBuffer, OutputMap},
  frame::InputTensor,
  resource::LabelTable,
};

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&mut self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

/// 输入像素坐标系下的矩形
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BoundingBox {
  pub left: f32,
  pub top: f32,
  pub right: f32,
  pub bottom: f32,
}

impl BoundingBox {
  pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
    Self {
      left,
      top,
      right,
      bottom,
    }
  }

  pub fn empty() -> Self {
    Self::default()
  }

  pub fn is_empty(&self) -> bool {
    self.left >= self.right || self.top >= self.bottom
  }

  pub fn width(&self) -> f32 {
    self.right - self.left
  }

  pub fn height(&self) -> f32 {
    self.bottom - self.top
  }
}

/// 对外统一的识别结果
#[derive(Debug, Clone, PartialEq)]
pub struct Recognition {
  pub id: String,
  pub label: String,
  pub score: f32,
  pub bbox: BoundingBox,
  pub embedding: Option<Box<[f32]>>,
}

impl Recognition {
  pub fn embedding(&self) -> Option<&[f32]> {
    self.embedding.as_deref()
  }

  /// 是否为特征向量结果，此时 score 与 bbox 无意义
  pub fn is_embedding(&self) -> bool {
    self.embedding.is_some()
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectItem {
  pub slot: usize,
  pub class_id: usize,
  pub label: String,
  pub score: f32,
  pub bbox: BoundingBox,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectResult {
  pub items: Box<[DetectItem]>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
  pub vector: Box<[f32]>,
}

impl Embedding {
  /// 欧氏距离，越小越相似
  pub fn distance(&self, other: &Embedding) -> f32 {
    self
      .vector
      .iter()
      .zip(other.vector.iter())
      .map(|(a, b)| (a - b) * (a - b))
      .sum::<f32>()
      .sqrt()
  }
}

/// 一次推理的结果，按模型族区分
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
  Detections(DetectResult),
  Embedding(Embedding),
}

impl Outcome {
  pub fn into_recognitions(self) -> Vec<Recognition> {
    match self {
      Outcome::Detections(result) => result
        .items
        .into_vec()
        .into_iter()
        .map(|item| Recognition {
          id: item.slot.to_string(),
          label: item.label,
          score: item.score,
          bbox: item.bbox,
          embedding: None,
        })
        .collect(),
      Outcome::Embedding(embedding) => vec![Recognition {
        id: "0".to_string(),
        label: "?".to_string(),
        score: EMBEDDING_SCORE,
        bbox: BoundingBox::empty(),
        embedding: Some(embedding.vector),
      }],
    }
  }
}

/// 模型族，构造时由量化标志确定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFamily {
  /// 量化多目标检测模型
  Detection,
  /// 浮点特征提取模型
  Embedding { len: usize },
}

impl ModelFamily {
  pub fn from_quantized(quantized: bool, embedding_len: usize) -> Self {
    if quantized {
      ModelFamily::Detection
    } else {
      ModelFamily::Embedding { len: embedding_len }
    }
  }

  pub fn is_quantized(&self) -> bool {
    matches!(self, ModelFamily::Detection)
  }

  pub fn input_tensor(&self, input_size: usize) -> InputTensor {
    match self {
      ModelFamily::Detection => InputTensor::quantized(input_size),
      ModelFamily::Embedding { .. } => InputTensor::float(input_size),
    }
  }

  pub fn output_buffers(&self) -> Vec<OutputBuffer> {
    match self {
      ModelFamily::Detection => detector::output_buffers(),
      ModelFamily::Embedding { len } => embedder::output_buffers(*len),
    }
  }

  pub fn postprocess(
    &self,
    outputs: &OutputMap,
    labels: &LabelTable,
    input_size: usize,
  ) -> Result<Outcome, EngineError> {
    match self {
      ModelFamily::Detection => detector::decode(outputs, labels, input_size).map(Outcome::Detections),
      ModelFamily::Embedding { .. } => embedder::decode(outputs).map(Outcome::Embedding),
    }
  }
}

mod detector;
mod embedder;
pub use self::detector::{LABEL_OFFSET, NUM_DETECTIONS};
pub use self::embedder::{DEFAULT_EMBEDDING_LEN, EMBEDDING_SCORE};
