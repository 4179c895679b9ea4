//! Settling control-loop models shared by the simulators.

use labmod_core::status::{SpeedStatus, TemperatureStatus};

/// A temperature control loop that settles after a fixed number of reads.
#[derive(Debug, Clone)]
pub(crate) struct TemperatureAxis {
    pub current: f64,
    pub target: Option<f64>,
    pub status: TemperatureStatus,
    polls_left: u32,
    settle_polls: u32,
}

impl TemperatureAxis {
    pub fn new(ambient: f64, settle_polls: u32) -> Self {
        Self {
            current: ambient,
            target: None,
            status: TemperatureStatus::Idle,
            polls_left: 0,
            settle_polls,
        }
    }

    pub fn set_target(&mut self, celsius: f64) {
        self.target = Some(celsius);
        self.polls_left = self.settle_polls;
        self.status = if celsius >= self.current {
            TemperatureStatus::Heating
        } else {
            TemperatureStatus::Cooling
        };
        if self.polls_left == 0 {
            self.settle();
        }
    }

    pub fn deactivate(&mut self) {
        self.target = None;
        self.polls_left = 0;
        self.status = TemperatureStatus::Idle;
    }

    /// Advance one status read and return the resulting status.
    pub fn poll(&mut self, stalled: bool) -> TemperatureStatus {
        if matches!(self.status, TemperatureStatus::Heating | TemperatureStatus::Cooling) && !stalled {
            if self.polls_left == 0 {
                self.settle();
            } else {
                self.polls_left -= 1;
            }
        }
        self.status
    }

    fn settle(&mut self) {
        if let Some(target) = self.target {
            self.current = target;
            self.status = TemperatureStatus::HoldingAtTarget;
        }
    }
}

/// A shaker motor that settles after a fixed number of reads.
#[derive(Debug, Clone)]
pub(crate) struct SpeedAxis {
    pub current: u32,
    pub target: Option<u32>,
    pub status: SpeedStatus,
    polls_left: u32,
    settle_polls: u32,
}

impl SpeedAxis {
    pub fn new(settle_polls: u32) -> Self {
        Self {
            current: 0,
            target: None,
            status: SpeedStatus::Idle,
            polls_left: 0,
            settle_polls,
        }
    }

    pub fn set_target(&mut self, rpm: u32) {
        self.status = if rpm >= self.current {
            SpeedStatus::SpeedingUp
        } else {
            SpeedStatus::SlowingDown
        };
        self.target = Some(rpm);
        self.polls_left = self.settle_polls;
    }

    pub fn deactivate(&mut self) {
        self.target = None;
        self.polls_left = self.settle_polls;
        self.status = if self.current > 0 {
            SpeedStatus::SlowingDown
        } else {
            SpeedStatus::Idle
        };
    }

    pub fn poll(&mut self, stalled: bool) -> SpeedStatus {
        if matches!(self.status, SpeedStatus::SpeedingUp | SpeedStatus::SlowingDown) && !stalled {
            if self.polls_left == 0 {
                match self.target {
                    Some(rpm) => {
                        self.current = rpm;
                        self.status = SpeedStatus::HoldingAtTarget;
                    }
                    None => {
                        self.current = 0;
                        self.status = SpeedStatus::Idle;
                    }
                }
            } else {
                self.polls_left -= 1;
            }
        }
        self.status
    }
}

/// Something that moves between two rest positions through a transit state.
#[derive(Debug, Clone)]
pub(crate) struct Motion<P: Copy> {
    pub position: P,
    destination: Option<P>,
    polls_left: u32,
    settle_polls: u32,
}

impl<P: Copy> Motion<P> {
    pub fn new(position: P, settle_polls: u32) -> Self {
        Self {
            position,
            destination: None,
            polls_left: 0,
            settle_polls,
        }
    }

    pub fn start(&mut self, transit: P, destination: P) {
        self.position = transit;
        self.destination = Some(destination);
        self.polls_left = self.settle_polls;
    }

    pub fn poll(&mut self, stalled: bool) -> P {
        if let Some(destination) = self.destination {
            if !stalled {
                if self.polls_left == 0 {
                    self.position = destination;
                    self.destination = None;
                } else {
                    self.polls_left -= 1;
                }
            }
        }
        self.position
    }
}
