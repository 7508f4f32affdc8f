// 该文件是 Facelite （轻量人脸推理） 项目的一部分。
// src/engine.rs - 推理引擎
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

use thiserror::Error;
use tracing::{debug, error, info};

use crate::{accel::DelegateSpec, frame::InputTensor, resource::MappedModel};

#[cfg(feature = "onnxruntime")]
mod onnx;
#[cfg(feature = "onnxruntime")]
pub use self::onnx::OnnxBackend;

#[derive(Error, Debug)]
pub enum EngineError {
  #[error("计算图构建失败: {0}")]
  Init(String),
  /// 属于构建期的编程错误，不是可恢复的运行时状况
  #[error("输出 {index} 形状不匹配: 期望 {expected:?}, 实际 {actual:?}")]
  ShapeMismatch {
    index: usize,
    expected: Vec<usize>,
    actual: Vec<usize>,
  },
  #[error("推理失败: {0}")]
  Inference(String),
}

impl EngineError {
  pub fn init(msg: impl std::fmt::Display) -> Self {
    EngineError::Init(msg.to_string())
  }

  pub fn inference(msg: impl std::fmt::Display) -> Self {
    EngineError::Inference(msg.to_string())
  }

  /// 构建期错误（包括输出形状不匹配）
  pub fn is_init(&self) -> bool {
    matches!(self, EngineError::Init(_) | EngineError::ShapeMismatch { .. })
  }
}

/// 执行选项：线程数与委托
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
  /// 0 表示使用运行时默认值
  pub threads: usize,
  pub delegate: DelegateSpec,
}

/// 调用方预分配的输出缓冲区
#[derive(Debug, Clone, PartialEq)]
pub struct OutputBuffer {
  shape: Vec<usize>,
  data: Box<[f32]>,
}

impl OutputBuffer {
  pub fn zeros(shape: &[usize]) -> Self {
    let len = shape.iter().product();
    Self {
      shape: shape.to_vec(),
      data: vec![0f32; len].into_boxed_slice(),
    }
  }

  pub fn shape(&self) -> &[usize] {
    &self.shape
  }

  pub fn data(&self) -> &[f32] {
    &self.data
  }

  pub fn reset(&mut self) {
    self.data.fill(0.0);
  }

  /// 写入一个输出张量，形状必须完全一致
  pub fn copy_from(&mut self, index: usize, shape: &[usize], data: &[f32]) -> Result<(), EngineError> {
    if shape != self.shape.as_slice() || data.len() != self.data.len() {
      error!(
        "输出 {} 形状不匹配: 期望 {:?}, 实际 {:?}",
        index, self.shape, shape
      );
      return Err(EngineError::ShapeMismatch {
        index,
        expected: self.shape.clone(),
        actual: shape.to_vec(),
      });
    }
    self.data.copy_from_slice(data);
    Ok(())
  }
}

/// 输出索引到缓冲区的映射，下标即输出索引
pub type OutputMap = [OutputBuffer];

/// 计算图运行时。构建失败报告为 `EngineError::Init`。
pub trait Backend: Sized {
  fn build(model: &MappedModel, options: &EngineOptions) -> Result<Self, EngineError>;

  /// 模型声明的输出形状，`None` 为动态维度
  fn output_shapes(&self) -> Vec<Vec<Option<usize>>>;

  /// 模型声明的输出数量
  fn num_outputs(&self) -> usize {
    self.output_shapes().len()
  }

  /// 执行一次前向计算，把第 i 个输出写入 `outputs[i]`
  fn run(&mut self, input: &InputTensor, outputs: &mut OutputMap) -> Result<(), EngineError>;
}

/// 持有映射权重与已构建计算图的引擎
pub struct TensorEngine<B> {
  backend: B,
  options: EngineOptions,
  model: MappedModel,
}

impl<B: Backend> TensorEngine<B> {
  pub fn new(model: MappedModel, options: EngineOptions) -> Result<Self, EngineError> {
    info!(
      "创建推理引擎, 线程数: {}, 加速模式: {:?}",
      options.threads,
      options.delegate.mode()
    );
    let backend = B::build(&model, &options).inspect_err(|e| error!("推理引擎创建失败: {}", e))?;
    debug!("模型输出数量: {}", backend.num_outputs());

    Ok(Self {
      backend,
      options,
      model,
    })
  }

  pub fn options(&self) -> &EngineOptions {
    &self.options
  }

  pub fn model(&self) -> &MappedModel {
    &self.model
  }

  pub fn num_outputs(&self) -> usize {
    self.backend.num_outputs()
  }

  /// 构建期校验：模型至少声明 `expected.len()` 个输出，且静态维度与缓冲区一致
  pub fn check_outputs(&self, expected: &OutputMap) -> Result<(), EngineError> {
    let declared = self.backend.output_shapes();
    if declared.len() < expected.len() {
      error!(
        "预期模型输出数量至少为 {}, 实际为 {}",
        expected.len(),
        declared.len()
      );
      return Err(EngineError::Init(format!(
        "预期模型输出数量至少为 {}, 实际为 {}",
        expected.len(),
        declared.len()
      )));
    }

    for (index, (dims, buffer)) in declared.iter().zip(expected).enumerate() {
      let matches = dims.len() == buffer.shape().len()
        && dims
          .iter()
          .zip(buffer.shape())
          .all(|(dim, want)| dim.is_none_or(|d| d == *want));
      if !matches {
        error!(
          "输出 {} 形状不匹配: 期望 {:?}, 模型声明 {:?}",
          index,
          buffer.shape(),
          dims
        );
        return Err(EngineError::Init(format!(
          "输出 {} 形状不匹配: 期望 {:?}, 模型声明 {:?}",
          index,
          buffer.shape(),
          dims
        )));
      }
    }
    Ok(())
  }

  /// 同步执行一次推理，阻塞到完成
  pub fn run(&mut self, input: &InputTensor, outputs: &mut OutputMap) -> Result<(), EngineError> {
    for output in outputs.iter_mut() {
      output.reset();
    }
    debug!("执行模型推理");
    self.backend.run(input, outputs)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn output_buffer_rejects_other_shapes() {
    let mut buffer = OutputBuffer::zeros(&[1, 10]);
    assert_eq!(buffer.data().len(), 10);

    let err = buffer.copy_from(2, &[1, 5], &[0.0; 5]).unwrap_err();
    assert!(err.is_init());
    match err {
      EngineError::ShapeMismatch {
        index,
        expected,
        actual,
      } => {
        assert_eq!(index, 2);
        assert_eq!(expected, vec![1, 10]);
        assert_eq!(actual, vec![1, 5]);
      }
      other => panic!("unexpected error: {other:?}"),
    }
  }

  #[test]
  fn output_buffer_copies_and_resets() {
    let mut buffer = OutputBuffer::zeros(&[1, 3]);
    buffer.copy_from(0, &[1, 3], &[1.0, 2.0, 3.0]).unwrap();
    assert_eq!(buffer.data(), &[1.0, 2.0, 3.0]);
    buffer.reset();
    assert_eq!(buffer.data(), &[0.0, 0.0, 0.0]);
  }

  #[test]
  fn inference_errors_are_not_init_errors() {
    assert!(!EngineError::inference("bad input").is_init());
    assert!(EngineError::init("bad weights").is_init());
  }
}
