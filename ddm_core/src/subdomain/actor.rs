//! Worker-side dispatcher that owns the real subdomain.

use ddm_env::Channel;
use tracing::{debug, error, info, warn};

use crate::broker::ObjectBroker;
use crate::error::{DdError, DdResult};
use crate::subdomain::local::LocalSubdomain;
use crate::subdomain::opcode::Opcode;
use crate::subdomain::protocol::{Reply, Request, REQUEST_DB_TAG};
use crate::subdomain::Subdomain;

/// How an actor loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActorExit {
    /// Tag of the subdomain when the loop ended
    pub tag: i32,
    /// Requests handled before `Die`
    pub requests_served: usize,
}

/// Serves one coordinator: receive an opcode, run it on the local subdomain,
/// reply. One request at a time, until `Die`.
pub struct ActorSubdomain<C: Channel> {
    channel: C,
    subdomain: LocalSubdomain,
    broker: ObjectBroker,
    requests_served: usize,
}

impl<C: Channel> ActorSubdomain<C> {
    pub fn new(channel: C, subdomain: LocalSubdomain) -> Self {
        Self {
            channel,
            subdomain,
            broker: ObjectBroker::default(),
            requests_served: 0,
        }
    }

    pub fn with_broker(channel: C, subdomain: LocalSubdomain, broker: ObjectBroker) -> Self {
        Self {
            channel,
            subdomain,
            broker,
            requests_served: 0,
        }
    }

    pub fn subdomain(&self) -> &LocalSubdomain {
        &self.subdomain
    }

    /// Runs the server loop.
    ///
    /// Returns on `Die`, dropping the subdomain. Failures of the subdomain
    /// itself are replied as a negative status and the loop goes on; transport
    /// failures and requests that break the protocol end the loop with an
    /// error.
    pub fn run(mut self) -> DdResult<ActorExit> {
        info!(subdomain = self.subdomain.tag(), peer = %self.channel.peer(), "actor started");
        loop {
            if !self.serve_one()? {
                let exit = ActorExit {
                    tag: self.subdomain.tag(),
                    requests_served: self.requests_served,
                };
                info!(subdomain = exit.tag, served = exit.requests_served, "actor terminated");
                return Ok(exit);
            }
        }
    }

    /// Serves a single request. Returns `false` once `Die` arrived.
    pub fn serve_one(&mut self) -> DdResult<bool> {
        let header = self.channel.recv_id(REQUEST_DB_TAG)?;
        let request = match Request::decode(&header, &mut self.channel, &self.broker) {
            Ok(request) => request,
            Err(err) => {
                match &err {
                    DdError::UnknownOpcode(code) => {
                        error!(subdomain = self.subdomain.tag(), code, "unknown opcode, protocol skew");
                    }
                    _ => {
                        error!(subdomain = self.subdomain.tag(), ?header, "bad request: {}", err);
                    }
                }
                return Err(err);
            }
        };

        let op = request.opcode();
        if op == Opcode::Die {
            return Ok(false);
        }
        debug!(subdomain = self.subdomain.tag(), ?op, "dispatch");

        let commit_tag = self.subdomain.domain().commit_tag();
        match request.apply(&mut self.subdomain) {
            Ok(reply) => reply.send(&mut self.channel, commit_tag)?,
            Err(err) => {
                warn!(subdomain = self.subdomain.tag(), ?op, status = err.status_code(), "{}", err);
                Reply::send_failure(&mut self.channel, commit_tag, &err)?;
            }
        }
        self.requests_served += 1;
        Ok(true)
    }
}
