// 该文件是 Facelite （轻量人脸推理） 项目的一部分。
// src/task.rs - 推理任务
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

use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::{model::Model, output::Render};

pub trait Task<I, M, O>: Sized {
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<(), Self::Error>;
}

pub struct OneShotTask;

impl<
  F,
  D,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = F>,
  M: Model<Input = F, Output = D, Error = ME>,
  O: Render<F, D, Error = RE>,
> Task<I, M, O> for OneShotTask
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, mut model: M, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    info!("输入帧获取成功，开始推理...");
    let now = Instant::now();
    let result = model.infer(&frame)?;
    info!("推理完成，耗时: {:.2?}", now.elapsed());
    output.render_result(&frame, &result)?;

    Ok(())
  }
}

/// 对同一帧重复推理，统计平均耗时
#[derive(Debug)]
pub struct RepeatShotTask {
  repeat: usize,
  warmup: usize,
}

impl Default for RepeatShotTask {
  fn default() -> Self {
    Self {
      repeat: 1000,
      warmup: 2,
    }
  }
}

impl RepeatShotTask {
  pub fn with_repeat(mut self, repeat: usize) -> Self {
    self.repeat = repeat;
    self
  }

  pub fn with_warmup(mut self, warmup: usize) -> Self {
    self.warmup = warmup;
    self
  }

  fn mean(&self, times: &[Duration]) -> Option<Duration> {
    let measured = times.get(self.warmup..).filter(|t| !t.is_empty())?;
    Some(measured.iter().sum::<Duration>() / measured.len() as u32)
  }
}

impl<
  F,
  D,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = F>,
  M: Model<Input = F, Output = D, Error = ME>,
  O: Render<F, D, Error = RE>,
> Task<I, M, O> for RepeatShotTask
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, mut model: M, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    info!("输入帧获取成功，开始推理...");
    let mut times = Vec::with_capacity(self.repeat);
    for i in 0..self.repeat {
      let now = Instant::now();
      let result = model.infer(&frame)?;
      let elapsed = now.elapsed();
      info!("({})推理完成，耗时: {:.2?}", i, elapsed);
      output.render_result(&frame, &result)?;
      times.push(elapsed);
    }

    match self.mean(&times) {
      Some(mean) => warn!("平均推理时间: {:.2?}", mean),
      None => warn!("重复次数不足 {}，不统计平均推理时间", self.warmup + 1),
    }

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use std::cell::Cell;

  use super::*;

  #[derive(Debug, thiserror::Error)]
  #[error("never")]
  struct Never;

  struct Doubler {
    calls: usize,
  }

  impl Model for Doubler {
    type Input = u32;
    type Output = u32;
    type Error = Never;

    fn infer(&mut self, input: &u32) -> Result<u32, Never> {
      self.calls += 1;
      Ok(input * 2)
    }
  }

  struct Recorder<'a> {
    seen: &'a Cell<u32>,
    renders: &'a Cell<usize>,
  }

  impl Render<u32, u32> for Recorder<'_> {
    type Error = Never;

    fn render_result(&self, _frame: &u32, result: &u32) -> Result<(), Never> {
      self.seen.set(*result);
      self.renders.set(self.renders.get() + 1);
      Ok(())
    }
  }

  #[test]
  fn one_shot_renders_first_frame() {
    let seen = Cell::new(0);
    let renders = Cell::new(0);
    let output = Recorder {
      seen: &seen,
      renders: &renders,
    };
    OneShotTask
      .run_task(vec![21u32, 50].into_iter(), Doubler { calls: 0 }, output)
      .unwrap();
    assert_eq!(seen.get(), 42);
    assert_eq!(renders.get(), 1);
  }

  #[test]
  fn one_shot_without_frames_fails() {
    let seen = Cell::new(0);
    let renders = Cell::new(0);
    let output = Recorder {
      seen: &seen,
      renders: &renders,
    };
    let result = OneShotTask.run_task(std::iter::empty::<u32>(), Doubler { calls: 0 }, output);
    assert!(result.is_err());
  }

  #[test]
  fn repeat_shot_renders_every_run() {
    let seen = Cell::new(0);
    let renders = Cell::new(0);
    let output = Recorder {
      seen: &seen,
      renders: &renders,
    };
    RepeatShotTask::default()
      .with_repeat(5)
      .run_task(std::iter::once(3u32), Doubler { calls: 0 }, output)
      .unwrap();
    assert_eq!(seen.get(), 6);
    assert_eq!(renders.get(), 5);
  }

  #[test]
  fn mean_skips_warmup_runs() {
    let task = RepeatShotTask::default().with_warmup(1);
    let times = [
      Duration::from_millis(100),
      Duration::from_millis(10),
      Duration::from_millis(20),
    ];
    assert_eq!(task.mean(&times), Some(Duration::from_millis(15)));
    assert_eq!(task.mean(&times[..1]), None);
  }
}
