use log::{debug, info};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use super::state::AppState;
use crate::transport::{run_connection, EventSender};
use crate::types::{Effect, PipelineEvent};

/// 单帧内最多处理的事件数，避免持续高速数据流阻塞界面
const MAX_EVENTS_PER_FRAME: usize = 1000;

impl AppState {
    /// 处理通道中积压的传输事件，返回处理数量
    pub fn process_pending_events(&mut self) -> usize {
        let mut handled = 0;
        while handled < MAX_EVENTS_PER_FRAME {
            let Ok(event) = self.link.events.receiver.try_recv() else {
                break;
            };
            self.dispatch(event);
            handled += 1;
        }
        handled
    }

    /// 事件交给管线处理，再执行管线返回的副作用
    pub fn dispatch(&mut self, event: PipelineEvent) {
        for effect in self.pipeline.dispatch(event) {
            self.apply_effect(effect);
        }
    }

    pub fn request_connect(&mut self) {
        self.dispatch(PipelineEvent::ConnectRequested);
    }

    pub fn request_plot(&mut self) {
        self.dispatch(PipelineEvent::VisualizeRequested);
    }

    fn apply_effect(&mut self, effect: Effect) {
        match effect {
            Effect::StartConnection { attempt } => {
                // 先更新编号，旧尝试的任务随即失效
                self.link.current_attempt.store(attempt, Ordering::Relaxed);
                let events = EventSender::new(
                    self.link.events.sender.clone(),
                    attempt,
                    Arc::clone(&self.link.current_attempt),
                    Arc::clone(&self.link.shutdown_signal),
                );
                let transport = Arc::clone(&self.link.transport);
                let target = self.link.target.clone();
                self.link.runtime.spawn(run_connection(transport, target, events));
                info!("Spawned connection attempt {}", attempt);
            }
            Effect::RevealReadings => {
                if !self.revealed {
                    debug!("Revealing readings and chart sections");
                }
                self.revealed = true;
            }
        }
    }
}
