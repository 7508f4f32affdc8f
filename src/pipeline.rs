// 该文件是 Facelite （轻量人脸推理） 项目的一部分。
// src/pipeline.rs - 识别管线
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

use std::str::FromStr;

use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  accel::{self, AccelerationError, AccelerationMode},
  engine::{Backend, EngineError, EngineOptions, OutputBuffer, TensorEngine},
  frame::{ArgbFrame, InputTensor},
  model::{DEFAULT_EMBEDDING_LEN, Model, ModelFamily, Outcome, Recognition},
  resource::{DirectoryAssets, LabelTable, ResourceError, ResourceLocator},
};

#[derive(Error, Debug)]
pub enum PipelineError {
  #[error("资源错误: {0}")]
  Resource(#[from] ResourceError),
  #[error("加速配置错误: {0}")]
  Acceleration(#[from] AccelerationError),
  #[error("推理引擎错误: {0}")]
  Engine(#[from] EngineError),
  #[error("输入尺寸不匹配: 期望 {expected}x{expected}, 实际 {width}x{height}, 像素数 {pixels}")]
  MalformedInput {
    expected: usize,
    width: usize,
    height: usize,
    pixels: usize,
  },
  #[error("模型路径错误: {0}")]
  InvalidUrl(String),
}

/// 构造后不可变的模型配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelConfig {
  pub input_size: usize,
  pub quantized: bool,
  pub threads: usize,
  pub acceleration: AccelerationMode,
  pub embedding_len: usize,
}

/// 单次推理使用的暂存缓冲区，尺寸在构造时固定
///
/// 并发调用者各自持有一份，不能在同时进行的调用间共享。
#[derive(Debug, Clone)]
pub struct Scratch {
  input: InputTensor,
  outputs: Vec<OutputBuffer>,
}

impl Scratch {
  pub fn new(family: ModelFamily, input_size: usize) -> Self {
    Self {
      input: family.input_tensor(input_size),
      outputs: family.output_buffers(),
    }
  }

  pub fn input(&self) -> &InputTensor {
    &self.input
  }

  pub fn outputs(&self) -> &[OutputBuffer] {
    &self.outputs
  }
}

pub struct PipelineBuilder {
  model_name: String,
  label_name: String,
  input_size: usize,
  quantized: bool,
  hw_acceleration: bool,
  enhanced_acceleration: bool,
  threads: usize,
  embedding_len: usize,
  locator: ResourceLocator,
}

const PIPELINE_SCHEME: &str = "face";

impl FromUrlWithScheme for PipelineBuilder {
  const SCHEME: &'static str = PIPELINE_SCHEME;
}

fn query_value<T: FromStr>(key: &str, value: &str) -> Result<T, PipelineError> {
  value
    .parse()
    .map_err(|_| PipelineError::InvalidUrl(format!("参数 {} 的值无效: {}", key, value)))
}

impl FromUrl for PipelineBuilder {
  type Error = PipelineError;

  /// `face:///<模型>?labels=<标签>&size=112&quantized=false&hw=false&enhanced=true&threads=4`
  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(PipelineError::InvalidUrl(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    let model_name = match url.path().trim_start_matches('/') {
      "" => url.host_str().unwrap_or_default().to_string(),
      path => path.to_string(),
    };
    if model_name.is_empty() {
      return Err(PipelineError::InvalidUrl("缺少模型名称".to_string()));
    }

    let mut builder = PipelineBuilder::new(model_name, String::new());
    for (key, value) in url.query_pairs() {
      builder = match &*key {
        "labels" => builder.labels(value.to_string()),
        "size" => builder.input_size(query_value(&key, &value)?),
        "quantized" => builder.quantized(query_value(&key, &value)?),
        "hw" => builder.hw_acceleration(query_value(&key, &value)?),
        "enhanced" => builder.enhanced_acceleration(query_value(&key, &value)?),
        "threads" => builder.threads(query_value(&key, &value)?),
        "embedding" => builder.embedding_len(query_value(&key, &value)?),
        "assets" => builder.assets(DirectoryAssets::new(value.to_string())),
        "system_dir" => builder.system_dir(value.to_string()),
        other => {
          return Err(PipelineError::InvalidUrl(format!("未知参数: {}", other)));
        }
      };
    }

    if builder.label_name.is_empty() {
      return Err(PipelineError::InvalidUrl("缺少 labels 参数".to_string()));
    }
    Ok(builder)
  }
}

impl PipelineBuilder {
  pub fn new(model_name: impl Into<String>, label_name: impl Into<String>) -> Self {
    Self {
      model_name: model_name.into(),
      label_name: label_name.into(),
      input_size: 112,
      quantized: false,
      hw_acceleration: false,
      enhanced_acceleration: false,
      threads: 1,
      embedding_len: DEFAULT_EMBEDDING_LEN,
      locator: ResourceLocator::default(),
    }
  }

  pub fn labels(mut self, label_name: impl Into<String>) -> Self {
    self.label_name = label_name.into();
    self
  }

  pub fn input_size(mut self, input_size: usize) -> Self {
    self.input_size = input_size;
    self
  }

  pub fn quantized(mut self, quantized: bool) -> Self {
    self.quantized = quantized;
    self
  }

  pub fn hw_acceleration(mut self, enabled: bool) -> Self {
    self.hw_acceleration = enabled;
    self
  }

  /// 硬件加速开启时选择 NNAPI 而非 GPU；关闭时控制 XNNPACK
  pub fn enhanced_acceleration(mut self, enabled: bool) -> Self {
    self.enhanced_acceleration = enabled;
    self
  }

  pub fn threads(mut self, threads: usize) -> Self {
    self.threads = threads;
    self
  }

  pub fn embedding_len(mut self, len: usize) -> Self {
    self.embedding_len = len;
    self
  }

  pub fn assets(mut self, assets: impl crate::resource::AssetStore + 'static) -> Self {
    self.locator = self.locator.assets(assets);
    self
  }

  pub fn system_dir(mut self, dir: impl Into<std::path::PathBuf>) -> Self {
    self.locator = self.locator.system_dir(dir);
    self
  }

  pub fn locator(mut self, locator: ResourceLocator) -> Self {
    self.locator = locator;
    self
  }

  /// 构造管线；任何一步失败都不会返回部分初始化的管线
  pub fn build<B: Backend>(self) -> Result<RecognitionPipeline<B>, PipelineError> {
    info!("加载标签文件: {}", self.label_name);
    let labels = self.locator.load_labels(&self.label_name)?;

    let delegate = accel::resolve(self.hw_acceleration, self.enhanced_acceleration)?;

    info!("加载模型文件: {}", self.model_name);
    let model = self.locator.load_model(&self.model_name)?;

    let options = EngineOptions {
      threads: self.threads,
      delegate,
    };
    let engine = TensorEngine::<B>::new(model, options)?;

    let family = ModelFamily::from_quantized(self.quantized, self.embedding_len);
    let scratch = Scratch::new(family, self.input_size);

    engine.check_outputs(&scratch.outputs)?;

    let config = ModelConfig {
      input_size: self.input_size,
      quantized: self.quantized,
      threads: self.threads,
      acceleration: delegate.mode(),
      embedding_len: self.embedding_len,
    };
    info!("管线创建完成: {:?}", config);

    Ok(RecognitionPipeline {
      config,
      family,
      labels,
      engine,
      scratch,
    })
  }
}

/// 一次加载、多次推理的识别管线
///
/// `recognize` 需要 `&mut self`，同一实例上的调用天然串行；
/// 跨线程共享时由调用方加锁。
pub struct RecognitionPipeline<B> {
  config: ModelConfig,
  family: ModelFamily,
  labels: LabelTable,
  engine: TensorEngine<B>,
  scratch: Scratch,
}

impl<B: Backend> RecognitionPipeline<B> {
  pub fn config(&self) -> &ModelConfig {
    &self.config
  }

  pub fn family(&self) -> ModelFamily {
    self.family
  }

  pub fn labels(&self) -> &LabelTable {
    &self.labels
  }

  pub fn engine(&self) -> &TensorEngine<B> {
    &self.engine
  }

  /// 预处理、推理、后处理，返回按模型族区分的结果
  pub fn infer_pixels(
    &mut self,
    pixels: &[u32],
    width: usize,
    height: usize,
  ) -> Result<Outcome, PipelineError> {
    let expected = self.config.input_size;
    if width != expected || height != expected || pixels.len() < expected * expected {
      error!(
        "输入尺寸不匹配: 期望 {}x{}, 实际 {}x{}",
        expected, expected, width, height
      );
      return Err(PipelineError::MalformedInput {
        expected,
        width,
        height,
        pixels: pixels.len(),
      });
    }

    let now = std::time::Instant::now();
    self.scratch.input.fill(pixels, width, height);
    debug!("预处理完成, 耗时: {:.2?}", now.elapsed());

    self.engine.run(&self.scratch.input, &mut self.scratch.outputs)?;
    debug!("推理完成, 耗时: {:.2?}", now.elapsed());

    let outcome = self
      .family
      .postprocess(&self.scratch.outputs, &self.labels, expected)?;
    Ok(outcome)
  }

  pub fn recognize(
    &mut self,
    pixels: &[u32],
    width: usize,
    height: usize,
  ) -> Result<Vec<Recognition>, PipelineError> {
    self
      .infer_pixels(pixels, width, height)
      .map(Outcome::into_recognitions)
  }
}

impl<B: Backend> Model for RecognitionPipeline<B> {
  type Input = ArgbFrame;
  type Output = Vec<Recognition>;
  type Error = PipelineError;

  fn infer(&mut self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    self.recognize(input.pixels(), input.width(), input.height())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn parse(url: &str) -> Result<PipelineBuilder, PipelineError> {
    PipelineBuilder::from_url(&Url::parse(url).unwrap())
  }

  #[test]
  fn url_configures_every_parameter() {
    let builder = parse(
      "face:///detect.onnx?labels=labelmap.txt&size=300&quantized=true&hw=true&enhanced=true&threads=2&embedding=192&system_dir=/opt/face",
    )
    .unwrap();
    assert_eq!(builder.model_name, "detect.onnx");
    assert_eq!(builder.label_name, "labelmap.txt");
    assert_eq!(builder.input_size, 300);
    assert!(builder.quantized);
    assert!(builder.hw_acceleration);
    assert!(builder.enhanced_acceleration);
    assert_eq!(builder.threads, 2);
    assert_eq!(builder.embedding_len, 192);
    assert_eq!(builder.locator.system_path(), std::path::Path::new("/opt/face"));
  }

  #[test]
  fn url_host_form_names_model() {
    let builder = parse("face://mobile_face_net.onnx?labels=labels.txt").unwrap();
    assert_eq!(builder.model_name, "mobile_face_net.onnx");
    assert_eq!(builder.input_size, 112);
    assert!(!builder.quantized);
  }

  #[test]
  fn url_rejects_bad_input() {
    assert!(matches!(
      parse("onnx:///model.onnx?labels=a.txt"),
      Err(PipelineError::InvalidUrl(_))
    ));
    assert!(matches!(
      parse("face:///model.onnx"),
      Err(PipelineError::InvalidUrl(_))
    ));
    assert!(matches!(
      parse("face:///model.onnx?labels=a.txt&size=big"),
      Err(PipelineError::InvalidUrl(_))
    ));
    assert!(matches!(
      parse("face:///model.onnx?labels=a.txt&colour=red"),
      Err(PipelineError::InvalidUrl(_))
    ));
  }

  #[test]
  fn scratch_is_sized_by_family() {
    let detect = Scratch::new(ModelFamily::Detection, 300);
    assert_eq!(detect.input().byte_len(), 300 * 300 * 3);
    assert_eq!(detect.outputs().len(), 4);

    let embed = Scratch::new(ModelFamily::Embedding { len: 512 }, 112);
    assert_eq!(embed.input().byte_len(), 112 * 112 * 3 * 4);
    assert_eq!(embed.outputs().len(), 1);
    assert_eq!(embed.outputs()[0].shape(), &[1, 512]);
  }
}
