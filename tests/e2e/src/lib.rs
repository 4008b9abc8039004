//! End-to-end scenarios over a simulated validator network.
//!
//! Each node runs the full stack — replica, adapter, in-memory store and
//! stream, mempool — and an in-process gateway delivers broadcasts
//! between them. Message pumping is explicit and deterministic: tests
//! drive the stream queues to quiescence instead of racing real timers.


#[cfg(test)]
mod basic_network;
#[cfg(test)]
mod leader_failover;
#[cfg(test)]
mod mempool_pressure;
#[cfg(test)]
mod redelivery;
