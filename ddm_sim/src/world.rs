//! SimWorld: a coordinator plus one worker per subdomain.

use ddm_core::{
    ActorExit, ActorSubdomain, AnalysisConfig, DdResult, DomainDecompositionDriver, DriverConfig,
    LocalSubdomain, ShadowSubdomain, Subdomain, SubdomainBlueprint,
};
use ddm_env::{memory_pair, Channel, TcpChannel};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{SocketAddr, TcpListener, ToSocketAddrs};
use std::str::FromStr;
use std::thread::{self, JoinHandle};
use tracing::{info, warn};

use crate::error::{SimError, SimResult};
use crate::network::{FaultController, FaultyChannel};

/// How the coordinator reaches its workers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// Worker threads behind in-process queues
    #[default]
    Memory,
    /// Workers behind loopback (or external) TCP sockets
    Tcp,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Memory => write!(f, "memory"),
            Transport::Tcp => write!(f, "tcp"),
        }
    }
}

impl FromStr for Transport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" | "mem" => Ok(Transport::Memory),
            "tcp" => Ok(Transport::Tcp),
            _ => Err(format!("Unknown transport: {}", s)),
        }
    }
}

/// Configuration for a simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Master seed for model generation
    pub seed: u64,

    /// Number of subdomains (one worker each)
    pub num_subdomains: usize,

    pub transport: Transport,

    /// Load steps per scenario
    pub steps: usize,

    /// With TCP: wait on this address for externally started workers
    /// (`ddm-sim worker --connect`) instead of spawning threads
    pub listen: Option<String>,

    /// Analysis installed on every worker
    pub analysis: AnalysisConfig,

    pub driver: DriverConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            num_subdomains: 3,
            transport: Transport::Memory,
            steps: 3,
            listen: None,
            analysis: AnalysisConfig::default(),
            driver: DriverConfig::default(),
        }
    }
}

impl SimConfig {
    /// Loads a configuration from JSON; missing fields keep their defaults.
    pub fn from_json(text: &str) -> SimResult<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// A worker thread and the tag of the subdomain it serves.
pub struct WorkerHandle {
    pub tag: i32,
    thread: JoinHandle<DdResult<ActorExit>>,
}

/// How a worker ended.
#[derive(Debug)]
pub struct WorkerOutcome {
    pub tag: i32,
    pub result: SimResult<ActorExit>,
}

/// Runs a worker that connects to a coordinator over TCP and serves until
/// told to terminate.
pub fn run_tcp_worker<A: ToSocketAddrs>(addr: A, tag: i32) -> DdResult<ActorExit> {
    let channel = TcpChannel::connect(addr)?;
    ActorSubdomain::new(channel, LocalSubdomain::new(tag)).run()
}

/// Coordinator side of a run: the driver over shadows, the worker threads,
/// and a fault controller per link.
pub struct SimWorld {
    driver: DomainDecompositionDriver,
    workers: Vec<WorkerHandle>,
    links: Vec<FaultController>,
}

impl SimWorld {
    /// Starts one worker per blueprint, ships each its blueprint and
    /// analysis, and numbers the interface.
    pub fn launch(config: &SimConfig, blueprints: Vec<SubdomainBlueprint>) -> SimResult<Self> {
        let mut workers = Vec::new();
        let mut links = Vec::new();
        let mut subdomains: Vec<Box<dyn Subdomain>> = Vec::new();

        match config.transport {
            Transport::Memory => {
                for blueprint in blueprints {
                    let tag = blueprint.tag;
                    let (coordinator, worker) = memory_pair(0, tag);
                    let thread = thread::Builder::new()
                        .name(format!("worker-{tag}"))
                        .spawn(move || ActorSubdomain::new(worker, LocalSubdomain::new(tag)).run())?;
                    workers.push(WorkerHandle { tag, thread });
                    let (shadow, link) = Self::shadow(coordinator, blueprint, &config.analysis)?;
                    subdomains.push(shadow);
                    links.push(link);
                }
            }
            Transport::Tcp => {
                let listener = TcpListener::bind(config.listen.as_deref().unwrap_or("127.0.0.1:0"))?;
                let addr: SocketAddr = listener.local_addr()?;
                if config.listen.is_some() {
                    info!(%addr, expected = blueprints.len(), "waiting for external workers");
                }
                for blueprint in blueprints {
                    let tag = blueprint.tag;
                    if config.listen.is_none() {
                        let thread = thread::Builder::new()
                            .name(format!("worker-{tag}"))
                            .spawn(move || run_tcp_worker(addr, tag))?;
                        workers.push(WorkerHandle { tag, thread });
                    }
                    let coordinator = TcpChannel::accept(&listener)?;
                    let (shadow, link) = Self::shadow(coordinator, blueprint, &config.analysis)?;
                    subdomains.push(shadow);
                    links.push(link);
                }
            }
        }

        let mut driver = DomainDecompositionDriver::new(subdomains, config.driver);
        driver.setup()?;
        info!(
            transport = %config.transport,
            subdomains = links.len(),
            interface = driver.interface_size(),
            "world launched"
        );
        Ok(Self {
            driver,
            workers,
            links,
        })
    }

    fn shadow<C: Channel + 'static>(
        channel: C,
        blueprint: SubdomainBlueprint,
        analysis: &AnalysisConfig,
    ) -> SimResult<(Box<dyn Subdomain>, FaultController)> {
        let channel = FaultyChannel::new(channel);
        let link = channel.controller();
        let mut shadow = ShadowSubdomain::new(blueprint.tag, channel);
        // an external worker starts under tag 0 until told otherwise
        shadow.set_tag(blueprint.tag)?;
        shadow.build_subdomain(blueprint)?;
        shadow.set_domain_decomp_analysis(analysis.clone())?;
        Ok((Box::new(shadow), link))
    }

    pub fn driver(&self) -> &DomainDecompositionDriver {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut DomainDecompositionDriver {
        &mut self.driver
    }

    /// Fault controller of the link to the `index`-th subdomain.
    pub fn link(&self, index: usize) -> Option<&FaultController> {
        self.links.get(index)
    }

    pub fn worker_count(&self) -> usize {
        self.links.len()
    }

    /// Terminates every shadow, which releases its worker, and joins the
    /// worker threads.
    pub fn shutdown(self) -> Vec<WorkerOutcome> {
        // dropping a healthy shadow sends the terminate opcode; a poisoned
        // one just closes its channel and the worker sees a hang-up
        drop(self.driver);

        self.workers
            .into_iter()
            .map(|worker| {
                let tag = worker.tag;
                let result = match worker.thread.join() {
                    Ok(result) => result.map_err(SimError::from),
                    Err(_) => Err(SimError::WorkerPanicked(tag)),
                };
                if let Err(err) = &result {
                    warn!(worker = tag, "worker ended with error: {}", err);
                }
                WorkerOutcome { tag, result }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model_gen::ModelGenerator;
    use ddm_core::Partitioner;

    #[test]
    fn test_transport_parsing() {
        assert_eq!("tcp".parse::<Transport>().unwrap(), Transport::Tcp);
        assert_eq!("MEMORY".parse::<Transport>().unwrap(), Transport::Memory);
        assert!("udp".parse::<Transport>().is_err());
    }

    #[test]
    fn test_config_json_defaults() {
        let config = SimConfig::from_json(r#"{ "seed": 9, "transport": "tcp" }"#).unwrap();
        assert_eq!(config.seed, 9);
        assert_eq!(config.transport, Transport::Tcp);
        assert_eq!(config.num_subdomains, SimConfig::default().num_subdomains);
        assert!(SimConfig::from_json("{ nope").is_err());
    }

    #[test]
    fn test_world_launch_and_shutdown() {
        let config = SimConfig::default();
        let model = ModelGenerator::new(config.seed).spring_chain(6, false);
        let blueprints = Partitioner::new(3).by_element_order(&model).unwrap();

        let world = SimWorld::launch(&config, blueprints).unwrap();
        assert_eq!(world.worker_count(), 3);
        assert_eq!(world.driver().interface_size(), 2);

        let outcomes = world.shutdown();
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes.iter().all(|o| o.result.is_ok()));
    }
}
