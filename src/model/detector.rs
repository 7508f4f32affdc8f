// 该文件是 Facelite （轻量人脸推理） 项目的一部分。
// src/model/detector.rs - 量化检测模型后处理
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

use tracing::{debug, error};

use super::{BoundingBox, DetectItem, DetectResult};
use crate::{
  engine::{EngineError, OutputBuffer, OutputMap},
  resource::LabelTable,
};

pub const NUM_DETECTIONS: usize = 10;
/// 标签表第 0 项为背景类，模型输出的类别从 0 开始
pub const LABEL_OFFSET: usize = 1;

const OUTPUT_LOCATIONS: usize = 0;
const OUTPUT_CLASSES: usize = 1;
const OUTPUT_SCORES: usize = 2;
const OUTPUT_NUM_DETECTIONS: usize = 3;

pub(super) fn output_buffers() -> Vec<OutputBuffer> {
  vec![
    OutputBuffer::zeros(&[1, NUM_DETECTIONS, 4]),
    OutputBuffer::zeros(&[1, NUM_DETECTIONS]),
    OutputBuffer::zeros(&[1, NUM_DETECTIONS]),
    OutputBuffer::zeros(&[1]),
  ]
}

fn output(outputs: &OutputMap, index: usize) -> Result<&[f32], EngineError> {
  outputs
    .get(index)
    .map(OutputBuffer::data)
    .ok_or_else(|| EngineError::Inference(format!("缺少检测输出 {}", index)))
}

/// 逐槽位解码，不做阈值过滤也不排序
pub(super) fn decode(
  outputs: &OutputMap,
  labels: &LabelTable,
  input_size: usize,
) -> Result<DetectResult, EngineError> {
  debug!("后处理检测输出");
  let locations = output(outputs, OUTPUT_LOCATIONS)?;
  let classes = output(outputs, OUTPUT_CLASSES)?;
  let scores = output(outputs, OUTPUT_SCORES)?;
  if let Some(num) = outputs.get(OUTPUT_NUM_DETECTIONS) {
    debug!("模型报告检测数量: {:?}", num.data().first());
  }

  let scale = input_size as f32;
  let mut items = Vec::with_capacity(NUM_DETECTIONS);

  for slot in 0..NUM_DETECTIONS {
    // 模型输出为 [y1, x1, y2, x2]
    let loc = &locations[slot * 4..slot * 4 + 4];
    let bbox = BoundingBox::new(loc[1] * scale, loc[0] * scale, loc[3] * scale, loc[2] * scale);

    let raw_class = classes[slot];
    if !(raw_class.is_finite() && raw_class >= 0.0) {
      error!("槽位 {} 类别无效: {}", slot, raw_class);
      return Err(EngineError::Inference(format!("槽位 {} 类别无效: {}", slot, raw_class)));
    }
    let class_id = raw_class as usize;
    let label = class_id
      .checked_add(LABEL_OFFSET)
      .and_then(|index| labels.get(index))
      .ok_or_else(|| {
        error!("类别 {} 超出标签表范围 {}", class_id, labels.len());
        EngineError::Inference(format!("类别 {} 超出标签表范围 {}", class_id, labels.len()))
      })?;

    items.push(DetectItem {
      slot,
      class_id,
      label: label.to_string(),
      score: scores[slot],
      bbox,
    });
  }

  debug!("检测结果: {:?}", items);
  Ok(DetectResult {
    items: items.into_boxed_slice(),
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  fn labels() -> LabelTable {
    LabelTable::from(vec!["???".to_string(), "face".to_string(), "mask".to_string()])
  }

  fn outputs(locations: &[f32], classes: &[f32], scores: &[f32]) -> Vec<OutputBuffer> {
    let mut buffers = output_buffers();
    buffers[0].copy_from(0, &[1, NUM_DETECTIONS, 4], locations).unwrap();
    buffers[1].copy_from(1, &[1, NUM_DETECTIONS], classes).unwrap();
    buffers[2].copy_from(2, &[1, NUM_DETECTIONS], scores).unwrap();
    buffers[3].copy_from(3, &[1], &[NUM_DETECTIONS as f32]).unwrap();
    buffers
  }

  #[test]
  fn box_axes_are_reordered_and_scaled() {
    let mut locations = [0f32; NUM_DETECTIONS * 4];
    locations[..4].copy_from_slice(&[0.1, 0.2, 0.3, 0.4]);
    let buffers = outputs(&locations, &[0.0; NUM_DETECTIONS], &[0.9; NUM_DETECTIONS]);

    let result = decode(&buffers, &labels(), 300).unwrap();
    let bbox = result.items[0].bbox;
    assert!((bbox.left - 60.0).abs() < 1e-4);
    assert!((bbox.top - 30.0).abs() < 1e-4);
    assert!((bbox.right - 120.0).abs() < 1e-4);
    assert!((bbox.bottom - 90.0).abs() < 1e-4);
  }

  #[test]
  fn class_index_is_offset_past_background() {
    let mut classes = [0f32; NUM_DETECTIONS];
    classes[1] = 1.0;
    let buffers = outputs(&[0.0; NUM_DETECTIONS * 4], &classes, &[0.5; NUM_DETECTIONS]);

    let result = decode(&buffers, &labels(), 300).unwrap();
    assert_eq!(result.items[0].label, "face");
    assert_eq!(result.items[1].label, "mask");
    assert!(result.items.iter().all(|item| item.label != "???"));
  }

  // 不按分数过滤，低分槽位同样保留
  #[test]
  fn every_slot_is_emitted_in_model_order() {
    let scores: Vec<f32> = (0..NUM_DETECTIONS).map(|i| i as f32 * 0.01).collect();
    let buffers = outputs(&[0.0; NUM_DETECTIONS * 4], &[0.0; NUM_DETECTIONS], &scores);

    let result = decode(&buffers, &labels(), 300).unwrap();
    assert_eq!(result.items.len(), NUM_DETECTIONS);
    for (i, item) in result.items.iter().enumerate() {
      assert_eq!(item.slot, i);
      assert_eq!(item.score, scores[i]);
    }
  }

  #[test]
  fn class_outside_label_table_is_an_inference_error() {
    let mut classes = [0f32; NUM_DETECTIONS];
    classes[4] = 2.0;
    let buffers = outputs(&[0.0; NUM_DETECTIONS * 4], &classes, &[0.5; NUM_DETECTIONS]);

    let err = decode(&buffers, &labels(), 300).unwrap_err();
    assert!(matches!(err, EngineError::Inference(_)));
  }

  #[test]
  fn huge_class_value_never_wraps_to_background() {
    let mut classes = [0f32; NUM_DETECTIONS];
    classes[0] = 1e30;
    let buffers = outputs(&[0.0; NUM_DETECTIONS * 4], &classes, &[0.5; NUM_DETECTIONS]);

    let err = decode(&buffers, &labels(), 300).unwrap_err();
    assert!(matches!(err, EngineError::Inference(_)));
  }
}
