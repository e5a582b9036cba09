use chrono::{DateTime, Utc};

/// Everything the two machines and the side-effect hooks say to each other.
///
/// `Time` is the only carrier variant; the rest are pure signals. Every
/// variant has a stable name which shows up in logs and which tests assert
/// against, so renaming one is a wire-format change.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Time(DateTime<Utc>),
    Start,
    Finish,
    Started,
    Finished,
    StartFailed,
    BadHealth,
    GoodHealth,
    StatusCheckDue,
    ChatMessageDue,
    HealthCheckDue,
    InvalidConfiguration,
    HardwareStartRequest,
    HardwareStopRequest,
    HardwareResetRequest,
    HardwareStarted,
    HardwareStopped,
    HardwareShutdown,
    HardwareShutdownFailed,
    HardwarePowerOffFailed,
    HardwareStartFailed,
    HardwareStopFailed,
    LowVoltage,
    VoltageRecovered,
    ControllerFailure,
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::Time(_) => "timeEvent",
            Event::Start => "startEvent",
            Event::Finish => "finishEvent",
            Event::Started => "startedEvent",
            Event::Finished => "finishedEvent",
            Event::StartFailed => "startFailedEvent",
            Event::BadHealth => "badHealthEvent",
            Event::GoodHealth => "goodHealthEvent",
            Event::StatusCheckDue => "statusCheckDueEvent",
            Event::ChatMessageDue => "chatMessageDueEvent",
            Event::HealthCheckDue => "healthCheckDueEvent",
            Event::InvalidConfiguration => "invalidConfigurationEvent",
            Event::HardwareStartRequest => "hardwareStartRequestEvent",
            Event::HardwareStopRequest => "hardwareStopRequestEvent",
            Event::HardwareResetRequest => "hardwareResetRequestEvent",
            Event::HardwareStarted => "hardwareStartedEvent",
            Event::HardwareStopped => "hardwareStoppedEvent",
            Event::HardwareShutdown => "hardwareShutdownEvent",
            Event::HardwareShutdownFailed => "hardwareShutdownFailedEvent",
            Event::HardwarePowerOffFailed => "hardwarePowerOffFailedEvent",
            Event::HardwareStartFailed => "hardwareStartFailedEvent",
            Event::HardwareStopFailed => "hardwareStopFailedEvent",
            Event::LowVoltage => "lowVoltageEvent",
            Event::VoltageRecovered => "voltageRecoveredEvent",
            Event::ControllerFailure => "controllerFailureEvent",
        }
    }
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
