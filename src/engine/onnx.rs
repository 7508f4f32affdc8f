// 该文件是 Facelite （轻量人脸推理） 项目的一部分。
// src/engine/onnx.rs - ONNX Runtime 推理后端
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

#[cfg(feature = "gpu")]
use ort::execution_providers::CUDAExecutionProvider;
use ort::{
  execution_providers::{ExecutionProviderDispatch, NNAPIExecutionProvider, XNNPACKExecutionProvider},
  session::Session,
  value::TensorRef,
};
use tracing::{debug, info};

use super::{Backend, EngineError, EngineOptions, OutputMap};
use crate::{accel::Delegate, frame::InputTensor, resource::MappedModel};

pub struct OnnxBackend {
  session: Session,
  output_names: Vec<String>,
  output_shapes: Vec<Vec<Option<usize>>>,
}

fn execution_providers(options: &EngineOptions) -> Vec<ExecutionProviderDispatch> {
  let mut providers = Vec::with_capacity(2);

  // 硬件委托注册失败必须报错，不允许静默回退到 CPU
  match options.delegate.delegate() {
    Some(Delegate::Nnapi) => {
      info!("使用 NNAPI 委托");
      providers.push(NNAPIExecutionProvider::default().build().error_on_failure());
    }
    #[cfg(feature = "gpu")]
    Some(Delegate::Gpu) => {
      info!("使用 GPU 委托");
      providers.push(CUDAExecutionProvider::default().build().error_on_failure());
    }
    None => {}
  }

  if options.delegate.use_xnnpack() {
    debug!("启用 XNNPACK");
    providers.push(XNNPACKExecutionProvider::default().build());
  }

  providers
}

impl Backend for OnnxBackend {
  fn build(model: &MappedModel, options: &EngineOptions) -> Result<Self, EngineError> {
    let mut builder = Session::builder().map_err(EngineError::init)?;
    if options.threads > 0 {
      builder = builder
        .with_intra_threads(options.threads)
        .map_err(EngineError::init)?;
    }

    let session = builder
      .with_execution_providers(execution_providers(options))
      .map_err(EngineError::init)?
      .commit_from_memory(model.as_bytes())
      .map_err(EngineError::init)?;

    if session.inputs.len() != 1 {
      return Err(EngineError::Init(format!(
        "预期模型输入数量为 1, 实际为 {}",
        session.inputs.len()
      )));
    }

    let output_names: Vec<String> = session.outputs.iter().map(|o| o.name.clone()).collect();
    // 非张量输出记为空形状，动态维度（负值）记为 None
    let output_shapes: Vec<Vec<Option<usize>>> = session
      .outputs
      .iter()
      .map(|o| {
        o.output_type
          .tensor_shape()
          .map(|shape| shape.iter().map(|&d| usize::try_from(d).ok()).collect())
          .unwrap_or_default()
      })
      .collect();
    debug!("模型输出: {:?}, 形状: {:?}", output_names, output_shapes);

    Ok(Self {
      session,
      output_names,
      output_shapes,
    })
  }

  fn output_shapes(&self) -> Vec<Vec<Option<usize>>> {
    self.output_shapes.clone()
  }

  fn run(&mut self, input: &InputTensor, outputs: &mut OutputMap) -> Result<(), EngineError> {
    let shape = input.shape();
    let results = match input {
      InputTensor::Quantized { data, .. } => {
        let tensor = TensorRef::from_array_view((shape, &data[..])).map_err(EngineError::inference)?;
        self
          .session
          .run(ort::inputs![tensor])
          .map_err(EngineError::inference)?
      }
      InputTensor::Float { data, .. } => {
        let tensor = TensorRef::from_array_view((shape, &data[..])).map_err(EngineError::inference)?;
        self
          .session
          .run(ort::inputs![tensor])
          .map_err(EngineError::inference)?
      }
    };

    for (index, (name, buffer)) in self.output_names.iter().zip(outputs.iter_mut()).enumerate() {
      let value = results
        .get(name.as_str())
        .ok_or_else(|| EngineError::Inference(format!("缺少输出 {}", name)))?;
      let (shape, data) = value
        .try_extract_tensor::<f32>()
        .map_err(EngineError::inference)?;
      let dims: Vec<usize> = shape.iter().map(|&d| d as usize).collect();
      buffer.copy_from(index, &dims, data)?;
    }
    Ok(())
  }
}
