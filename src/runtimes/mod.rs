//! Container runtime implementations.
//!
//! Each runtime implements [`ContainerRuntime`] for one kind of engine.
//! The task runner only ever talks to the trait.
//!
//! [`ContainerRuntime`]: crate::runtime::ContainerRuntime

pub mod docker;

pub use self::docker::DockerRuntime;
