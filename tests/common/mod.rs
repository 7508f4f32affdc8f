// 该文件是 Facelite （轻量人脸推理） 项目的一部分。
// tests/common/mod.rs - 集成测试公共工具
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

#![allow(dead_code)]

use std::path::Path;

use facelite::{
  engine::{Backend, EngineError, EngineOptions, OutputMap},
  frame::InputTensor,
  model::NUM_DETECTIONS,
  resource::MappedModel,
};

pub const LABELS: &str = "???\nface\nmask\n";

/// 按模型文件内容决定行为的后端
///
/// - `detector`: 四个检测输出，分数取自输入前几个字节
/// - `detector-single`: 只声明一个输出
/// - `embedding:<len>`: 一个 `[1, len]` 输出，循环复制输入浮点值
/// - `embedding:dynamic`: 同上，但输出维度为动态，长度取自缓冲区
/// - 其他内容: 构建失败
#[derive(Debug)]
pub enum ScriptedBackend {
  Detector { outputs: usize },
  Embedding { len: Option<usize> },
}

impl Backend for ScriptedBackend {
  fn build(model: &MappedModel, _options: &EngineOptions) -> Result<Self, EngineError> {
    let text = std::str::from_utf8(model.as_bytes()).map_err(EngineError::init)?;
    match text.trim() {
      "detector" => Ok(ScriptedBackend::Detector { outputs: 4 }),
      "detector-single" => Ok(ScriptedBackend::Detector { outputs: 1 }),
      "embedding:dynamic" => Ok(ScriptedBackend::Embedding { len: None }),
      other => match other.strip_prefix("embedding:") {
        Some(len) => Ok(ScriptedBackend::Embedding {
          len: Some(len.parse().map_err(EngineError::init)?),
        }),
        None => Err(EngineError::init(format!("无法解析模型: {}", other))),
      },
    }
  }

  fn output_shapes(&self) -> Vec<Vec<Option<usize>>> {
    match self {
      ScriptedBackend::Detector { outputs } => vec![
        vec![Some(1), Some(NUM_DETECTIONS), Some(4)],
        vec![Some(1), Some(NUM_DETECTIONS)],
        vec![Some(1), Some(NUM_DETECTIONS)],
        vec![Some(1)],
      ]
      .into_iter()
      .take(*outputs)
      .collect(),
      ScriptedBackend::Embedding { len } => vec![vec![Some(1), *len]],
    }
  }

  fn run(&mut self, input: &InputTensor, outputs: &mut OutputMap) -> Result<(), EngineError> {
    match (self, input) {
      (ScriptedBackend::Detector { .. }, InputTensor::Quantized { data, .. }) => {
        let mut locations = Vec::with_capacity(NUM_DETECTIONS * 4);
        let mut classes = Vec::with_capacity(NUM_DETECTIONS);
        let mut scores = Vec::with_capacity(NUM_DETECTIONS);
        for slot in 0..NUM_DETECTIONS {
          let step = slot as f32 / NUM_DETECTIONS as f32;
          locations.extend_from_slice(&[step, step / 2.0, step + 0.1, step / 2.0 + 0.1]);
          classes.push((slot % 2) as f32);
          scores.push(data[slot] as f32 / 255.0);
        }
        outputs[0].copy_from(0, &[1, NUM_DETECTIONS, 4], &locations)?;
        outputs[1].copy_from(1, &[1, NUM_DETECTIONS], &classes)?;
        outputs[2].copy_from(2, &[1, NUM_DETECTIONS], &scores)?;
        outputs[3].copy_from(3, &[1], &[NUM_DETECTIONS as f32])?;
        Ok(())
      }
      (ScriptedBackend::Embedding { len }, InputTensor::Float { data, .. }) => {
        let len = len.unwrap_or_else(|| outputs[0].shape()[1]);
        let vector: Vec<f32> = data.iter().copied().cycle().take(len).collect();
        outputs[0].copy_from(0, &[1, len], &vector)
      }
      _ => Err(EngineError::inference("输入张量类型与模型不符")),
    }
  }
}

pub fn write_file(dir: &Path, name: &str, contents: &[u8]) {
  std::fs::write(dir.join(name), contents).unwrap();
}

/// 所有像素为同一 ARGB 值的正方形帧
pub fn solid_pixels(size: usize, argb: u32) -> Vec<u32> {
  vec![argb; size * size]
}
