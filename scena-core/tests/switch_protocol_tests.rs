//! End-to-end tests of the content switch protocol through the episode
//! core facade, with a recording renderer component.

use std::sync::{Arc, Mutex};

use scena_core::{
    Asset, Component, ContentState, CoreHandle, EpisodeCore, EpisodeCoreConfig, EpisodeData,
    Error, ImmediateExecutionQueue, SequenceEvent, StateTrigger, PAUSE_TRIGGER_EXTENSION_ID,
};
use scena_timeline::Clock;

fn asset(id: &str, duration: Option<f64>) -> Asset {
    Asset {
        id: id.to_owned(),
        duration,
        spec: serde_json::Value::Null,
        preload_disabled: false,
        early_destroy_on_switch: false,
    }
}

fn manual_core(config: EpisodeCoreConfig) -> (EpisodeCore, Clock) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
    let clock = Clock::manual(0.0);
    let core = EpisodeCore::with_parts(config, clock.clone(), Arc::new(ImmediateExecutionQueue));
    (core, clock)
}

async fn settle() {
    for _ in 0..30 {
        tokio::task::yield_now().await;
    }
}

/// Strip the per-instance suffix so logs are stable across runs.
fn base(instance_id: &str) -> &str {
    instance_id.split('#').next().unwrap_or(instance_id)
}

/// Renderer double: records lifecycle calls and reports every created
/// content ready from a spawned task.
#[derive(Default)]
struct Recorder {
    log: Arc<Mutex<Vec<String>>>,
    created: Arc<Mutex<Vec<String>>>,
    handle: Mutex<Option<CoreHandle>>,
}

impl Recorder {
    fn attach(&self, handle: CoreHandle) {
        *self.handle.lock().unwrap() = Some(handle);
    }

    fn log_line(&self, line: String) {
        self.log.lock().unwrap().push(line);
    }
}

impl Component for Recorder {
    fn create_content(&self, id: &str, _spec: &serde_json::Value) {
        self.log_line(format!("create {}", base(id)));
        self.created.lock().unwrap().push(id.to_owned());
        let handle = self.handle.lock().unwrap().clone().unwrap();
        let id = id.to_owned();
        tokio::spawn(async move {
            let _ = handle.update_content_state(&id, ContentState::Ready);
        });
    }

    fn show_content(&self, id: &str) {
        self.log_line(format!("show {}", base(id)));
    }

    fn hide_content(&self, id: &str) {
        self.log_line(format!("hide {}", base(id)));
    }

    fn destroy_content(&self, id: &str) {
        self.log_line(format!("destroy {}", base(id)));
    }
}

#[tokio::test]
async fn test_finish_switches_with_show_before_hide() {
    let (core, clock) = manual_core(EpisodeCoreConfig::default());
    let recorder = Arc::new(Recorder::default());
    let handle = core.register_component("stage", Arc::clone(&recorder) as Arc<dyn Component>);
    recorder.attach(handle.clone());

    core.initialize_episode(EpisodeData {
        assets: vec![asset("a", Some(1000.0)), asset("b", Some(2000.0))],
    })
    .unwrap();
    let sequence = core.sequence().unwrap();
    sequence.first_ready_signal().wait().await.unwrap();
    settle().await;
    core.play().unwrap();

    let mut events = sequence.subscribe_events();
    clock.advance(1000.0);
    core.tick();

    // the component declares segment 0 done
    let first = recorder.created.lock().unwrap()[0].clone();
    handle.finish_itself(&first).unwrap();
    settle().await;

    assert_eq!(
        events.try_recv().unwrap(),
        SequenceEvent::SegmentEnd { segment: 0 }
    );
    assert_eq!(
        events.try_recv().unwrap(),
        SequenceEvent::SegmentStart { segment: 1 }
    );

    // show-before-hide: b must appear before a disappears
    let log = recorder.log.lock().unwrap().clone();
    let show_b = log.iter().position(|l| l == "show b").unwrap();
    let hide_a = log.iter().position(|l| l == "hide a").unwrap();
    assert!(
        show_b < hide_a,
        "expected show b before hide a, got {log:?}"
    );
}

#[tokio::test]
async fn test_duplicate_queued_task_rejected_while_pending() {
    /// Holds its queued tasks open forever.
    #[derive(Default)]
    struct Stalling {
        inner: Recorder,
    }
    impl Component for Stalling {
        fn create_content(&self, id: &str, spec: &serde_json::Value) {
            self.inner.create_content(id, spec);
        }
        fn run_queued_task(
            &self,
            _task_id: &str,
        ) -> Option<futures::future::BoxFuture<'static, ()>> {
            Some(Box::pin(futures::future::pending()))
        }
    }

    let (core, _clock) = manual_core(EpisodeCoreConfig::default());
    let stalling = Arc::new(Stalling::default());
    let handle = core.register_component("stage", Arc::clone(&stalling) as Arc<dyn Component>);
    stalling.inner.attach(handle.clone());

    core.initialize_episode(EpisodeData {
        assets: vec![asset("a", Some(1000.0))],
    })
    .unwrap();
    core.sequence().unwrap().first_ready_signal().wait().await.unwrap();
    settle().await;

    let instance_id = stalling.inner.created.lock().unwrap()[0].clone();
    let task = handle.require_queued_task("warmup", &instance_id).unwrap();
    settle().await;
    assert!(!task.signal().is_settled());
    assert_eq!(
        handle
            .require_queued_task("warmup", &instance_id)
            .unwrap_err(),
        Error::TaskAlreadyAdded("warmup".to_owned())
    );
}

/// Records the transport hints forwarded to the component driving an
/// asset's clock.
#[derive(Default)]
struct Transport {
    calls: Arc<Mutex<Vec<&'static str>>>,
}

impl Component for Transport {
    fn play(&self) {
        self.calls.lock().unwrap().push("play");
    }
    fn pause(&self) {
        self.calls.lock().unwrap().push("pause");
    }
}

#[tokio::test]
async fn test_pause_trigger_pauses_and_corrects_overshoot() {
    let (core, clock) = manual_core(EpisodeCoreConfig::default());
    let recorder = Arc::new(Recorder::default());
    let handle = core.register_component("stage", Arc::clone(&recorder) as Arc<dyn Component>);
    recorder.attach(handle.clone());
    // registered under the asset id, so it drives asset a's clock
    let transport = Arc::new(Transport::default());
    core.register_component("a", Arc::clone(&transport) as Arc<dyn Component>);

    core.initialize_episode(EpisodeData {
        assets: vec![asset("a", Some(5000.0))],
    })
    .unwrap();
    let sequence = core.sequence().unwrap();
    sequence.first_ready_signal().wait().await.unwrap();
    settle().await;

    let instance_id = recorder.created.lock().unwrap()[0].clone();
    handle
        .set_state_triggers(
            &instance_id,
            Some(vec![StateTrigger::Point {
                id: "chapter-gate".to_owned(),
                extension_id: PAUSE_TRIGGER_EXTENSION_ID.to_owned(),
                time: 500.0,
                once: false,
                trigger_on_seek: false,
                spec: serde_json::Value::Null,
            }]),
        )
        .unwrap();
    core.play().unwrap();

    // the tick that crosses the trigger lands 100ms past it
    clock.advance(600.0);
    core.tick();
    settle().await;

    assert!(!*sequence.watch_playing().borrow());
    // overshoot beyond the 33ms threshold snaps back to just after the
    // trigger
    assert_eq!(sequence.time(), 501.0);
    // the driving component heard both transport edges
    assert_eq!(*transport.calls.lock().unwrap(), vec!["play", "pause"]);
}

#[tokio::test]
async fn test_initial_asset_status_starts_later_segment() {
    let (core, _clock) = manual_core(EpisodeCoreConfig {
        initial_asset_status: scena_core::InitialAssetStatus {
            order: 1,
            time: 250.0,
        },
        ..Default::default()
    });
    let recorder = Arc::new(Recorder::default());
    let handle = core.register_component("stage", Arc::clone(&recorder) as Arc<dyn Component>);
    recorder.attach(handle);

    core.initialize_episode(EpisodeData {
        assets: vec![asset("a", Some(1000.0)), asset("b", Some(2000.0))],
    })
    .unwrap();
    let sequence = core.sequence().unwrap();
    sequence.first_ready_signal().wait().await.unwrap();
    settle().await;

    assert_eq!(sequence.current_segment(), Some(1));
    assert_eq!(sequence.time(), 250.0);
    // segment 0 was never created
    let log = recorder.log.lock().unwrap().clone();
    assert!(!log.iter().any(|l| l == "create a"), "got {log:?}");
}
