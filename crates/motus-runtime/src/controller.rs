//! [`Controller`] – inbound text to queued commands and one reply.
//!
//! Runs in the async context, away from the simulation thread.  Every
//! inbound line produces exactly one reply, already HTML-escaped for the UI
//! channel.  Routing, first match wins:
//!
//! 1. empty text → rejected;
//! 2. `status` → the latest [`ExecutionSnapshot`];
//! 3. exact gripper phrases → gripper command, no translation;
//! 4. raw directives (`forward 1.0 2.0`, `stop`) → base command;
//! 5. anything else → translator, expansion, preset fallback.
//!
//! [`Controller::serve`] answers lines 1–4 as soon as they arrive.  Lines
//! that need translation go to a single worker, so plans are queued in
//! arrival order among themselves while a `stop` typed behind a slow
//! translation is queued at once.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{info, instrument, warn};

use crate::command_queue::CommandSender;
use crate::directive::{parse_directive, parse_gripper_phrase};
use crate::plan::{PlanExpander, PlanSource};
use crate::scheduler::ExecutionSnapshot;
use crate::translator::PlanTranslator;

/// Escape `&`, `<`, `>` and newlines for the HTML text channel.
pub fn escape_reply(reply: &str) -> String {
    let mut out = String::with_capacity(reply.len());
    for c in reply.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\n' => out.push_str("<br>"),
            other => out.push(other),
        }
    }
    out
}

/// One inbound line and where to send its reply.
#[derive(Debug)]
pub struct Inbound {
    pub text: String,
    pub reply: oneshot::Sender<String>,
}

pub struct Controller {
    translator: Arc<dyn PlanTranslator>,
    expander: PlanExpander,
    queue: CommandSender,
    status: watch::Receiver<ExecutionSnapshot>,
}

impl Controller {
    pub fn new(
        translator: Arc<dyn PlanTranslator>,
        expander: PlanExpander,
        queue: CommandSender,
        status: watch::Receiver<ExecutionSnapshot>,
    ) -> Self {
        Self {
            translator,
            expander,
            queue,
            status,
        }
    }

    /// Handle one inbound line and return the escaped reply.
    #[instrument(skip(self))]
    pub async fn handle(&self, text: &str) -> String {
        let text = text.trim();
        let reply = match self.respond_now(text) {
            Some(reply) => reply,
            None => self.translate_and_queue(text).await,
        };
        info!(reply = %reply, "reply");
        escape_reply(&reply)
    }

    /// Serve inbound lines until every sender is dropped.
    ///
    /// Lines that need no translation are answered immediately; the rest are
    /// handled one at a time, in arrival order, by a translation worker.
    pub async fn serve(self, mut inbound: mpsc::Receiver<Inbound>) {
        let controller = Arc::new(self);
        let (pending, mut to_translate) = mpsc::unbounded_channel::<Inbound>();
        let worker = {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move {
                while let Some(msg) = to_translate.recv().await {
                    let reply = controller.handle(&msg.text).await;
                    deliver(msg.reply, reply);
                }
            })
        };

        while let Some(msg) = inbound.recv().await {
            let text = msg.text.trim();
            match controller.respond_now(text) {
                Some(reply) => {
                    info!(text = %text, reply = %reply, "reply");
                    deliver(msg.reply, escape_reply(&reply));
                }
                None => {
                    if let Err(mpsc::error::SendError(msg)) = pending.send(msg) {
                        warn!(text = %msg.text, "translation worker gone; line dropped");
                    }
                }
            }
        }

        drop(pending);
        if let Err(e) = worker.await {
            warn!(error = %e, "translation worker panicked");
        }
    }

    /// Answer lines that need no translation.  `None` means the line must
    /// go through the translator.
    fn respond_now(&self, text: &str) -> Option<String> {
        if text.is_empty() {
            return Some("empty command".to_string());
        }
        if text.eq_ignore_ascii_case("status") {
            return Some(format!("status: {}", *self.status.borrow()));
        }

        if let Some(action) = parse_gripper_phrase(text) {
            self.queue.enqueue(self.expander.gripper(action));
            return Some(format!("queued: {action} gripper (queue depth {})", self.queue.len()));
        }
        if let Some(directive) = parse_directive(text) {
            self.queue.enqueue(self.expander.directive(&directive));
            return Some(format!("queued: {directive} (queue depth {})", self.queue.len()));
        }
        None
    }

    async fn translate_and_queue(&self, text: &str) -> String {
        let (steps, failure) = match self.translator.translate(text).await {
            Ok(steps) => (steps, None),
            Err(e) => {
                warn!(error = %e, "translation failed; trying preset fallback");
                (Vec::new(), Some(e))
            }
        };

        let expansion = self.expander.expand_with_fallback(&steps, text);
        let queued = self.queue.enqueue_batch(expansion.commands.iter().cloned());
        match expansion.source {
            PlanSource::Translated { steps } => format!("plan {steps} steps, queued {queued}"),
            PlanSource::Preset(name) => {
                let targets = expansion
                    .commands
                    .first()
                    .map(|c| {
                        c.targets
                            .iter()
                            .map(|(j, a)| format!("{j}={a:.2}"))
                            .collect::<Vec<_>>()
                            .join(", ")
                    })
                    .unwrap_or_default();
                format!("preset '{name}' queued: {targets}")
            }
            PlanSource::Nothing => match failure {
                Some(e) => format!("could not understand command ({e})"),
                None => "could not understand command".to_string(),
            },
        }
    }
}

fn deliver(reply_to: oneshot::Sender<String>, reply: String) {
    if reply_to.send(reply).is_err() {
        warn!("requester went away before the reply");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command_queue::{CommandReceiver, command_queue};
    use crate::plan::{ExpanderConfig, StepDescription};
    use crate::translator::{OfflineTranslator, TranslateError};
    use async_trait::async_trait;
    use motus_hal::sim::{GRIPPER_FINGERS, GRIPPER_LIMITS};
    use motus_types::CommandKind;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    // ------------------------------------------------------------------
    // Test doubles
    // ------------------------------------------------------------------

    struct ScriptedTranslator {
        steps: Vec<StepDescription>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PlanTranslator for ScriptedTranslator {
        async fn translate(
            &self,
            _utterance: &str,
        ) -> Result<Vec<StepDescription>, TranslateError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.steps.clone())
        }
    }

    /// Holds every translation until the gate is opened.
    struct GatedTranslator {
        gate: tokio::sync::Notify,
        steps: Vec<StepDescription>,
    }

    #[async_trait]
    impl PlanTranslator for GatedTranslator {
        async fn translate(
            &self,
            _utterance: &str,
        ) -> Result<Vec<StepDescription>, TranslateError> {
            self.gate.notified().await;
            Ok(self.steps.clone())
        }
    }

    fn scripted(steps: Vec<StepDescription>) -> Arc<ScriptedTranslator> {
        Arc::new(ScriptedTranslator {
            steps,
            calls: AtomicUsize::new(0),
        })
    }

    fn controller(
        translator: Arc<dyn PlanTranslator>,
    ) -> (Controller, CommandReceiver, watch::Sender<ExecutionSnapshot>) {
        let limits: BTreeMap<_, _> = GRIPPER_FINGERS
            .iter()
            .map(|f| (f.to_string(), GRIPPER_LIMITS))
            .collect();
        let expander = PlanExpander::new(ExpanderConfig::default(), limits);
        let (tx, rx) = command_queue();
        let (status_tx, status_rx) = watch::channel(ExecutionSnapshot::default());
        (Controller::new(translator, expander, tx, status_rx), rx, status_tx)
    }

    fn drain(rx: &mut CommandReceiver) -> Vec<CommandKind> {
        std::iter::from_fn(|| rx.try_dequeue_front()).map(|c| c.kind).collect()
    }

    // ------------------------------------------------------------------
    // Tests
    // ------------------------------------------------------------------

    #[test]
    fn escape_reply_handles_angle_brackets_and_newlines() {
        assert_eq!(escape_reply("a<b>\nc"), "a&lt;b&gt;<br>c");
        assert_eq!(escape_reply("plain & simple"), "plain &amp; simple");
        assert_eq!(escape_reply("&lt;"), "&amp;lt;");
    }

    #[tokio::test]
    async fn empty_text_is_rejected() {
        let (c, mut rx, _s) = controller(Arc::new(OfflineTranslator));
        assert_eq!(c.handle("   ").await, "empty command");
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn gripper_phrase_skips_translation() {
        let t = scripted(vec![]);
        let (c, mut rx, _s) = controller(t.clone());
        let reply = c.handle("close gripper").await;
        assert!(reply.starts_with("queued: close gripper"));
        assert_eq!(drain(&mut rx), vec![CommandKind::CloseGripper]);
        assert_eq!(t.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn directive_skips_translation() {
        let t = scripted(vec![]);
        let (c, mut rx, _s) = controller(t.clone());
        c.handle("forward 1.0 2.0").await;
        c.handle("stop").await;
        assert_eq!(drain(&mut rx), vec![CommandKind::MoveBase, CommandKind::Stop]);
        assert_eq!(t.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn translated_plan_is_queued_in_order() {
        let t = scripted(vec![
            StepDescription::new("move_arm", json!({"targets": {"elbow_joint": 1.5}})),
            StepDescription::new("control_gripper", json!({"action": "close"})),
            StepDescription::new("juggle", json!({})),
            StepDescription::new("wait", json!({"seconds": 0.5})),
        ]);
        let (c, mut rx, _s) = controller(t);
        assert_eq!(c.handle("pick it up").await, "plan 4 steps, queued 3");
        assert_eq!(
            drain(&mut rx),
            vec![CommandKind::MoveJoints, CommandKind::CloseGripper, CommandKind::Wait]
        );
    }

    #[tokio::test]
    async fn failed_translation_falls_back_to_preset() {
        let (c, mut rx, _s) = controller(Arc::new(OfflineTranslator));
        let reply = c.handle("arm to home").await;
        assert!(reply.starts_with("preset 'home' queued:"), "{reply}");
        assert!(reply.contains("shoulder_lift_joint=-1.57"));
        assert_eq!(drain(&mut rx), vec![CommandKind::MoveJoints]);
    }

    #[tokio::test]
    async fn unknown_text_without_translator_is_reported() {
        let (c, mut rx, _s) = controller(Arc::new(OfflineTranslator));
        let reply = c.handle("<script>").await;
        assert!(reply.starts_with("could not understand command"));
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn status_reports_snapshot() {
        let (c, _rx, status) = controller(Arc::new(OfflineTranslator));
        status.send_replace(ExecutionSnapshot {
            queue_depth: 4,
            ..ExecutionSnapshot::default()
        });
        let reply = c.handle("STATUS").await;
        assert!(reply.starts_with("status: idle"));
        assert!(reply.contains("queued 4"));
    }

    #[tokio::test]
    async fn serve_answers_every_inbound_line() {
        let (c, mut rx, _s) = controller(Arc::new(OfflineTranslator));
        let (tx, inbound) = mpsc::channel(4);
        let server = tokio::spawn(c.serve(inbound));

        let mut replies = Vec::new();
        for text in ["open gripper", "lift", "nonsense"] {
            let (reply_tx, reply_rx) = oneshot::channel();
            tx.send(Inbound {
                text: text.to_string(),
                reply: reply_tx,
            })
            .await
            .unwrap();
            replies.push(reply_rx.await.unwrap());
        }
        drop(tx);
        server.await.unwrap();

        assert_eq!(replies.len(), 3);
        assert_eq!(drain(&mut rx), vec![CommandKind::OpenGripper, CommandKind::MoveJoints]);
    }

    #[tokio::test]
    async fn stop_is_queued_while_translation_is_pending() {
        let t = Arc::new(GatedTranslator {
            gate: tokio::sync::Notify::new(),
            steps: vec![StepDescription::new("wait", json!({"seconds": 0.5}))],
        });
        let (c, mut rx, _s) = controller(t.clone());
        let (tx, inbound) = mpsc::channel(4);
        let server = tokio::spawn(c.serve(inbound));

        let (slow_tx, slow_rx) = oneshot::channel();
        tx.send(Inbound {
            text: "pause for a moment".to_string(),
            reply: slow_tx,
        })
        .await
        .unwrap();
        let (stop_tx, stop_rx) = oneshot::channel();
        tx.send(Inbound {
            text: "stop".to_string(),
            reply: stop_tx,
        })
        .await
        .unwrap();

        let stop_reply = stop_rx.await.unwrap();
        assert!(stop_reply.starts_with("queued: stop"), "{stop_reply}");
        assert_eq!(drain(&mut rx), vec![CommandKind::Stop]);

        t.gate.notify_one();
        assert_eq!(slow_rx.await.unwrap(), "plan 1 steps, queued 1");
        assert_eq!(drain(&mut rx), vec![CommandKind::Wait]);

        drop(tx);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn translated_lines_keep_arrival_order() {
        let t = scripted(vec![StepDescription::new("wait", json!({"seconds": 0.5}))]);
        let (c, mut rx, _s) = controller(t.clone());
        let (tx, inbound) = mpsc::channel(4);
        let server = tokio::spawn(c.serve(inbound));

        let mut pending = Vec::new();
        for text in ["first thing", "second thing"] {
            let (reply_tx, reply_rx) = oneshot::channel();
            tx.send(Inbound {
                text: text.to_string(),
                reply: reply_tx,
            })
            .await
            .unwrap();
            pending.push(reply_rx);
        }
        for reply in pending {
            assert_eq!(reply.await.unwrap(), "plan 1 steps, queued 1");
        }
        drop(tx);
        server.await.unwrap();

        assert_eq!(t.calls.load(Ordering::SeqCst), 2);
        assert_eq!(drain(&mut rx), vec![CommandKind::Wait, CommandKind::Wait]);
    }
}
