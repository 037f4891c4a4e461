// Process wiring: zenoh in/out around a fixed-period control thread
//
// Input tasks parse commands and reconfigure requests and hand them to the
// controller through its lock-free buffers. The control loop runs on its own
// OS thread and never awaits; it pushes cycle reports into a bounded channel
// with `try_send`, dropping them if the publisher falls behind.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

use crate::config::{ControllerConfig, MotorConfig, RuntimeConfig, TopicConfig};
use crate::controller::hardware::RobotHardware;
use crate::controller::{ControllerHandle, CycleReport, DynamicParams, SwerveController};
use crate::messages::{
    OdometryMsg, ReconfigureRequest, RuntimeHealth, TransformMsg, VelocityCommand, WheelStatusMsg,
};
use crate::motor::{FeetechError, FeetechHardware, SimHardware};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Outbound queue depth, in cycles
const EVENT_QUEUE: usize = 64;

/// One cycle as seen by the publisher
#[derive(Debug, Clone, Copy)]
pub struct CycleEvent {
    pub report: CycleReport,
    pub state_changed: bool,
}

/// Serialized-ready messages for one cycle
#[derive(Debug, Default)]
pub struct Outbound {
    pub odom: Option<OdometryMsg>,
    pub tf: Option<TransformMsg>,
    pub wheels: Option<WheelStatusMsg>,
    pub health: Option<RuntimeHealth>,
}

impl Outbound {
    pub fn from_event(event: &CycleEvent, config: &ControllerConfig) -> Self {
        let report = &event.report;
        let mut out = Outbound::default();
        if report.publish {
            out.odom = Some(OdometryMsg::new(
                &report.odometry,
                &config.odom_frame_id,
                &config.base_frame_id,
            ));
            out.wheels = Some(WheelStatusMsg::new(
                &report.targets,
                report.translation_suppressed,
            ));
            if report.broadcast_odom {
                out.tf = Some(TransformMsg::new(
                    &report.odometry,
                    &config.odom_frame_id,
                    &config.base_frame_id,
                ));
            }
        }
        if report.publish || event.state_changed {
            out.health = Some(RuntimeHealth::from(report.state));
        }
        out
    }

    /// JSON payloads in publish order
    fn encode(&self) -> Vec<(Topic, serde_json::Result<String>)> {
        fn json<T: Serialize>(msg: &T) -> serde_json::Result<String> {
            serde_json::to_string(msg)
        }
        let mut payloads = Vec::with_capacity(4);
        if let Some(odom) = &self.odom {
            payloads.push((Topic::Odom, json(odom)));
        }
        if let Some(tf) = &self.tf {
            payloads.push((Topic::Tf, json(tf)));
        }
        if let Some(wheels) = &self.wheels {
            payloads.push((Topic::Wheels, json(wheels)));
        }
        if let Some(health) = &self.health {
            payloads.push((Topic::Health, json(health)));
        }
        payloads
    }
}

/// Outbound key expressions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Topic {
    Odom,
    Tf,
    Wheels,
    Health,
}

/// Where encoded cycle messages go
trait MessageSink {
    async fn put(&self, topic: Topic, payload: String) -> Result<(), BoxError>;
}

struct ZenohSink {
    odom: zenoh::pubsub::Publisher<'static>,
    tf: zenoh::pubsub::Publisher<'static>,
    wheels: zenoh::pubsub::Publisher<'static>,
    health: zenoh::pubsub::Publisher<'static>,
}

impl ZenohSink {
    async fn declare(session: &zenoh::Session, topics: &TopicConfig) -> Result<Self, BoxError> {
        let sink = Self {
            odom: session.declare_publisher(topics.odom.clone()).await?,
            tf: session.declare_publisher(topics.tf.clone()).await?,
            wheels: session.declare_publisher(topics.wheels.clone()).await?,
            health: session.declare_publisher(topics.health.clone()).await?,
        };
        info!(
            "Publishing to: {}, {}, {}, {}",
            topics.odom, topics.tf, topics.wheels, topics.health
        );
        Ok(sink)
    }
}

impl MessageSink for ZenohSink {
    async fn put(&self, topic: Topic, payload: String) -> Result<(), BoxError> {
        let publisher = match topic {
            Topic::Odom => &self.odom,
            Topic::Tf => &self.tf,
            Topic::Wheels => &self.wheels,
            Topic::Health => &self.health,
        };
        publisher.put(payload).await
    }
}

/// Parse a velocity command and hand it to the controller
fn on_command(payload: &[u8], handle: &ControllerHandle) -> bool {
    match serde_json::from_slice::<VelocityCommand>(payload) {
        Ok(cmd) if cmd.is_finite() => {
            debug!("Received command: {:?}", cmd);
            handle.send_command(cmd.linear_x, cmd.linear_y, cmd.angular_z);
            true
        }
        Ok(cmd) => {
            warn!("Ignoring non-finite command: {:?}", cmd);
            false
        }
        Err(e) => {
            warn!("Failed to parse command: {}", e);
            false
        }
    }
}

/// Parse a reconfigure request, overlay it on `current` and queue the result.
/// `current` only moves when the overlay is valid.
fn on_reconfigure(payload: &[u8], current: &mut DynamicParams, handle: &ControllerHandle) -> bool {
    match serde_json::from_slice::<ReconfigureRequest>(payload) {
        Ok(req) => {
            let next = req.apply_to(*current);
            if !next.is_valid() {
                warn!("Ignoring invalid reconfigure request: {:?}", req);
                return false;
            }
            *current = next;
            info!("Reconfigure requested: {:?}", next);
            handle.reconfigure(next);
            true
        }
        Err(e) => {
            warn!("Failed to parse reconfigure request: {}", e);
            false
        }
    }
}

/// Pick the actuator back-end
fn open_hardware(
    motors: &MotorConfig,
    sim: bool,
) -> Result<Box<dyn RobotHardware + Send>, FeetechError> {
    if sim || !motors.enabled {
        info!("Using simulated joints");
        return Ok(Box::new(SimHardware::new()));
    }
    let mut hw = FeetechHardware::open(&motors.port, &motors.ids)?;
    hw.initialize()?;
    Ok(Box::new(hw))
}

/// Run the controller at its configured rate until `running` is cleared
fn control_loop(
    mut controller: SwerveController,
    mut hw: Box<dyn RobotHardware + Send>,
    events: mpsc::Sender<CycleEvent>,
    running: Arc<AtomicBool>,
) {
    let period = controller.config().loop_period();
    let mut last = Instant::now();
    let mut deadline = last;
    let mut last_state = None;
    let mut publisher_gone = false;

    controller.start(last, &mut *hw);

    while running.load(Ordering::Acquire) {
        deadline += period;
        let now = Instant::now();
        if deadline > now {
            std::thread::sleep(deadline - now);
        } else {
            debug!("Control cycle overran by {:?}", now - deadline);
            deadline = now;
        }

        let now = Instant::now();
        let report = controller.update(now, now - last, &mut *hw);
        last = now;

        let state_changed = last_state != Some(report.state);
        last_state = Some(report.state);
        if report.publish || state_changed {
            let event = CycleEvent {
                report,
                state_changed,
            };
            match events.try_send(event) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => debug!("Publisher behind, dropping cycle report"),
                Err(TrySendError::Closed(_)) => {
                    if !publisher_gone {
                        warn!("Publisher task gone, cycle reports are no longer published");
                        publisher_gone = true;
                    }
                }
            }
        }
    }

    controller.stop(&mut *hw);
    let report = controller.update(Instant::now(), period, &mut *hw);
    let _ = events.try_send(CycleEvent {
        report,
        state_changed: true,
    });
    info!("Control loop exited");
}

fn spawn_control_loop(
    controller: SwerveController,
    hw: Box<dyn RobotHardware + Send>,
    events: mpsc::Sender<CycleEvent>,
    running: Arc<AtomicBool>,
) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("swerve-control".to_string())
        .spawn(move || control_loop(controller, hw, events, running))
}

/// Publish every queued cycle until the control thread hangs up.
/// Failed messages are logged and skipped; returns how many were lost.
async fn publish_loop<S: MessageSink>(
    sink: &S,
    config: &ControllerConfig,
    mut events: mpsc::Receiver<CycleEvent>,
) -> usize {
    let mut failed = 0;
    while let Some(event) = events.recv().await {
        let out = Outbound::from_event(&event, config);
        if let Some(health) = out.health {
            if event.state_changed {
                info!("Health: {:?}", health);
            }
        }
        for (topic, payload) in out.encode() {
            let result = match payload {
                Ok(json) => sink.put(topic, json).await,
                Err(e) => Err(e.into()),
            };
            if let Err(e) = result {
                warn!("Failed to publish {:?}: {}", topic, e);
                failed += 1;
            }
        }
    }
    failed
}

pub async fn run(config: RuntimeConfig, sim: bool) -> Result<(), BoxError> {
    let hw = open_hardware(&config.motors, sim)?;
    let controller = SwerveController::new(config.controller.clone(), &*hw)?;
    let handle = controller.handle();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up subscribers...");
    let cmd_sub = session.declare_subscriber(config.topics.cmd.clone()).await?;
    let reconf_sub = session
        .declare_subscriber(config.topics.reconfigure.clone())
        .await?;
    info!(
        "Subscribed to: {}, {}",
        config.topics.cmd, config.topics.reconfigure
    );

    let cmd_task = {
        let handle = handle.clone();
        tokio::spawn(async move {
            while let Ok(sample) = cmd_sub.recv_async().await {
                on_command(&sample.payload().to_bytes(), &handle);
            }
        })
    };

    let reconf_task = {
        let handle = handle.clone();
        let mut current = controller.params();
        tokio::spawn(async move {
            while let Ok(sample) = reconf_sub.recv_async().await {
                on_reconfigure(&sample.payload().to_bytes(), &mut current, &handle);
            }
        })
    };

    let sink = ZenohSink::declare(&session, &config.topics).await?;
    let (tx, rx) = mpsc::channel(EVENT_QUEUE);
    let publisher = {
        let controller_config = config.controller.clone();
        tokio::spawn(async move { publish_loop(&sink, &controller_config, rx).await })
    };

    info!(
        "Runtime started: {}Hz loop, {}ms watchdog timeout",
        config.controller.loop_hz,
        config.controller.cmd_timeout().as_millis()
    );
    let running = Arc::new(AtomicBool::new(true));
    let control = spawn_control_loop(controller, hw, tx, running.clone())?;

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");
    running.store(false, Ordering::Release);

    if tokio::task::spawn_blocking(move || control.join())
        .await?
        .is_err()
    {
        warn!("Control thread panicked");
    }
    cmd_task.abort();
    reconf_task.abort();

    // Sender side is gone once the control thread exits
    let failed = publisher.await?;
    if failed > 0 {
        warn!("{} outbound messages could not be published", failed);
    }
    session.close().await?;
    Ok(())
}
