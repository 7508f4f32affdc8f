// 该文件是 Facelite （轻量人脸推理） 项目的一部分。
// src/accel.rs - 硬件加速委托选择
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
use tracing::debug;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccelerationError {
  #[error("不支持的加速方式: {0}")]
  Unsupported(&'static str),
}

/// 硬件委托。未启用 `gpu` 特性时不存在 GPU 变体。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delegate {
  Nnapi,
  #[cfg(feature = "gpu")]
  Gpu,
}

/// 最终生效的加速模式，记录在 `ModelConfig` 中
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccelerationMode {
  None,
  Xnnpack,
  Nnapi,
  #[cfg(feature = "gpu")]
  Gpu,
}

/// 委托选择结果，构造后不可变
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelegateSpec {
  delegate: Option<Delegate>,
  xnnpack: bool,
}

impl DelegateSpec {
  pub fn delegate(&self) -> Option<Delegate> {
    self.delegate
  }

  pub fn use_xnnpack(&self) -> bool {
    self.xnnpack
  }

  pub fn mode(&self) -> AccelerationMode {
    match self.delegate {
      Some(Delegate::Nnapi) => AccelerationMode::Nnapi,
      #[cfg(feature = "gpu")]
      Some(Delegate::Gpu) => AccelerationMode::Gpu,
      None if self.xnnpack => AccelerationMode::Xnnpack,
      None => AccelerationMode::None,
    }
  }
}

/// 当前构建是否包含 GPU 委托
pub const fn gpu_supported() -> bool {
  cfg!(feature = "gpu")
}

/// 根据配置选择硬件委托。
///
/// - `hw_acceleration = false`：不使用硬件委托，`use_enhanced` 仅控制 XNNPACK。
/// - `hw_acceleration = true, use_enhanced = true`：NNAPI。
/// - `hw_acceleration = true, use_enhanced = false`：GPU，未编译 GPU 支持时返回错误而不降级。
///
/// 启用 `gpu` 特性时这里总是成功；CUDA 执行提供者注册失败发生在构建引擎时，
/// 报告为 `EngineError::Init` 而不是 `AccelerationError::Unsupported`。
pub fn resolve(hw_acceleration: bool, use_enhanced: bool) -> Result<DelegateSpec, AccelerationError> {
  let xnnpack = hw_acceleration || use_enhanced;

  let delegate = match (hw_acceleration, use_enhanced) {
    (false, _) => None,
    (true, true) => Some(Delegate::Nnapi),
    (true, false) => Some(acquire_gpu()?),
  };

  let spec = DelegateSpec { delegate, xnnpack };
  debug!("委托选择结果: {:?}", spec);
  Ok(spec)
}

#[cfg(feature = "gpu")]
fn acquire_gpu() -> Result<Delegate, AccelerationError> {
  Ok(Delegate::Gpu)
}

#[cfg(not(feature = "gpu"))]
fn acquire_gpu() -> Result<Delegate, AccelerationError> {
  tracing::error!("编译时未包含 GPU 支持，无法创建 GPU 委托");
  Err(AccelerationError::Unsupported("GPU 委托未编译"))
}
