//! Startup gate that waits for the hardware device nodes to appear.
//!
//! On boot the kernel may still be creating `/dev/spidev*` and friends when
//! the daemon starts. [`await_ready`] polls for the nodes and reports what is
//! still missing once the deadline passes; the caller decides whether to
//! continue degraded.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tagplay_core::constants::{GPIO_DEVICE_NODE, I2C_DEVICE_NODE, SPI_DEVICE_NODE};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Bus a device node belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    I2c,
    Spi,
    Gpio,
}

impl NodeKind {
    /// Whether the gate keeps waiting while a node of this kind is missing.
    ///
    /// GPIO is only warned about: encoder lines are also reachable through
    /// sysfs when `/dev/gpiomem` is absent.
    pub fn is_blocking(self) -> bool {
        !matches!(self, Self::Gpio)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Self::I2c => "I2C",
            Self::Spi => "SPI",
            Self::Gpio => "GPIO",
        };
        write!(f, "{}", kind)
    }
}

/// A device node the daemon needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceNode {
    pub path: PathBuf,
    pub kind: NodeKind,
}

impl DeviceNode {
    pub fn new(path: impl Into<PathBuf>, kind: NodeKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }

    /// The reference build's nodes: display bus, reader bus, encoder GPIO.
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new(I2C_DEVICE_NODE, NodeKind::I2c),
            Self::new(SPI_DEVICE_NODE, NodeKind::Spi),
            Self::new(GPIO_DEVICE_NODE, NodeKind::Gpio),
        ]
    }

    fn exists(&self) -> bool {
        Path::new(&self.path).exists()
    }
}

impl fmt::Display for DeviceNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.path.display(), self.kind)
    }
}

/// All blocking nodes are present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ready {
    /// Time spent waiting.
    pub waited: Duration,

    /// Non-blocking nodes that were still absent.
    pub missing_optional: Vec<DeviceNode>,
}

/// Blocking nodes were still missing when the deadline passed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Hardware not ready after {}s, missing: {}", waited.as_secs(), join_nodes(missing))]
pub struct NotReady {
    pub missing: Vec<DeviceNode>,
    pub waited: Duration,
}

fn join_nodes(nodes: &[DeviceNode]) -> String {
    nodes
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Wait until every blocking node in `required` exists.
///
/// Checks every `per_check_wait` and gives up after `max_wait`.
///
/// # Errors
///
/// Returns [`NotReady`] listing the blocking nodes that never appeared.
pub async fn await_ready(
    required: &[DeviceNode],
    per_check_wait: Duration,
    max_wait: Duration,
) -> Result<Ready, NotReady> {
    let started = Instant::now();

    loop {
        let (missing_blocking, missing_optional): (Vec<_>, Vec<_>) = required
            .iter()
            .filter(|node| !node.exists())
            .cloned()
            .partition(|node| node.kind.is_blocking());

        let waited = started.elapsed();

        if missing_blocking.is_empty() {
            for node in &missing_optional {
                warn!("Optional device node {} is missing", node);
            }
            info!("Hardware ready after {:?}", waited);
            return Ok(Ready {
                waited,
                missing_optional,
            });
        }

        if waited >= max_wait {
            return Err(NotReady {
                missing: missing_blocking,
                waited,
            });
        }

        for node in &missing_blocking {
            warn!("Waiting for device node {}", node);
        }
        debug!("Rechecking device nodes in {:?}", per_check_wait);
        tokio::time::sleep(per_check_wait).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        std::fs::write(path, b"").unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_nodes_present() {
        let dir = TempDir::new().unwrap();
        let spi = dir.path().join("spidev0.0");
        touch(&spi);

        let ready = await_ready(
            &[DeviceNode::new(&spi, NodeKind::Spi)],
            Duration::from_secs(1),
            Duration::from_secs(30),
        )
        .await
        .unwrap();

        assert_eq!(ready.waited, Duration::ZERO);
        assert!(ready.missing_optional.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_gpio_does_not_block() {
        let dir = TempDir::new().unwrap();
        let i2c = dir.path().join("i2c-1");
        touch(&i2c);

        let nodes = [
            DeviceNode::new(&i2c, NodeKind::I2c),
            DeviceNode::new(dir.path().join("gpiomem"), NodeKind::Gpio),
        ];
        let ready = await_ready(&nodes, Duration::from_secs(1), Duration::from_secs(30))
            .await
            .unwrap();

        assert_eq!(ready.missing_optional, vec![nodes[1].clone()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_wait() {
        let dir = TempDir::new().unwrap();
        let spi = DeviceNode::new(dir.path().join("spidev0.0"), NodeKind::Spi);

        let err = await_ready(
            std::slice::from_ref(&spi),
            Duration::from_secs(1),
            Duration::from_secs(5),
        )
        .await
        .unwrap_err();

        assert_eq!(err.missing, vec![spi]);
        assert!(err.waited >= Duration::from_secs(5));
        assert!(err.to_string().contains("spidev0.0 (SPI)"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_node_appearing_late() {
        let dir = TempDir::new().unwrap();
        let spi = dir.path().join("spidev0.0");

        let late = spi.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(2500)).await;
            touch(&late);
        });

        let ready = await_ready(
            &[DeviceNode::new(&spi, NodeKind::Spi)],
            Duration::from_secs(1),
            Duration::from_secs(30),
        )
        .await
        .unwrap();

        assert!(ready.waited >= Duration::from_millis(2500));
        assert!(ready.waited < Duration::from_secs(30));
    }

    #[test]
    fn test_default_nodes() {
        let nodes = DeviceNode::defaults();
        assert_eq!(nodes.len(), 3);
        assert!(nodes[1].kind.is_blocking());
        assert!(!nodes[2].kind.is_blocking());
    }
}
