use crate::common::{RelayCommand, Task};
use crate::console::{Command, HELP};
use crate::dashboard::Dashboard;
use crate::device_client::DeviceClient;
use log::{debug, info, warn};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

#[derive(Debug, PartialEq)]
pub enum Flow {
    Continue(Vec<String>),
    Quit,
}

/// Owns the dashboard; device requests run on their own tasks and report
/// back through `sender`.
pub struct App {
    dashboard: Dashboard,
    device: DeviceClient,
    sender: UnboundedSender<Task>,
}

impl App {
    pub fn new(dashboard: Dashboard, device: DeviceClient, sender: UnboundedSender<Task>) -> App {
        App {
            dashboard,
            device,
            sender,
        }
    }

    pub fn dashboard(&self) -> &Dashboard {
        &self.dashboard
    }

    pub fn handle_task(&mut self, task: Task) -> Flow {
        match task {
            Task::Sensor(response) => {
                self.dashboard.apply_sensor(&response);
                debug!(
                    "sensor: {} °C, {} %",
                    self.dashboard.temperature(),
                    self.dashboard.humidity()
                );
                Flow::Continue(vec![])
            }
            Task::Command(command) => self.handle_command(command),
            Task::RelayDone(command, result) => {
                if let Err(e) = &result {
                    warn!("relay {} request failed ({:?})", command.relay, e);
                }
                self.dashboard.apply_relay_done(&command, &result);
                Flow::Continue(vec![])
            }
            Task::RoutineDone(routine, result) => match result {
                Ok(()) => Flow::Continue(vec![self.dashboard.routine_confirmation(&routine)]),
                Err(e) => {
                    warn!("routine set failed ({:?})", e);
                    Flow::Continue(vec![])
                }
            },
        }
    }

    fn handle_command(&mut self, command: Command) -> Flow {
        match command {
            Command::Status => return Flow::Continue(vec![self.dashboard.render()]),
            Command::Toggle(relay) => self.send_relay(self.dashboard.toggle(relay)),
            Command::Switch(relay, state) => self.send_relay(self.dashboard.switch(relay, state)),
            Command::Run {
                relay,
                hours,
                minutes,
            } => {
                self.dashboard.set_duration_form(relay, &hours, &minutes);
                match self.dashboard.run(relay) {
                    Some(command) => self.send_relay(command),
                    None => info!("relay {}: nothing to run for {}h {}m", relay, hours, minutes),
                }
            }
            Command::Routine {
                relay,
                hour,
                minute,
                duration_min,
            } => {
                self.dashboard
                    .set_routine_form(relay, &hour, &minute, &duration_min);
                let routine = self.dashboard.routine(relay);
                let device = self.device.clone();
                let sender = self.sender.clone();
                tokio::spawn(async move {
                    let result = device.request_set_routine(&routine).await;
                    if let Err(e) = sender.send(Task::RoutineDone(routine, result)) {
                        warn!("send to dashboard failed ({:?})", e);
                    }
                });
            }
            Command::Help => return Flow::Continue(vec![HELP.to_string()]),
            Command::Invalid(reason) => return Flow::Continue(vec![reason, HELP.to_string()]),
            Command::Quit => return Flow::Quit,
        }
        Flow::Continue(vec![])
    }

    fn send_relay(&self, command: RelayCommand) {
        let device = self.device.clone();
        let sender = self.sender.clone();
        tokio::spawn(async move {
            let result = device.request_relay_action(&command).await;
            if let Err(e) = sender.send(Task::RelayDone(command, result)) {
                warn!("send to dashboard failed ({:?})", e);
            }
        });
    }

    pub async fn run(mut self, mut receiver: UnboundedReceiver<Task>) {
        println!("{}", self.dashboard.render());

        while let Some(task) = receiver.recv().await {
            match self.handle_task(task) {
                Flow::Continue(notices) => {
                    for notice in notices {
                        println!("{}", notice);
                    }
                }
                Flow::Quit => break,
            }
        }
        info!("dashboard closed");
    }
}
