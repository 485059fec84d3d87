use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum TailError {
    #[error("unable to load in-cluster configuration, are you running inside a pod?")]
    InCluster(#[source] kube::config::InClusterError),

    #[error("unable to load kubeconfig")]
    Kubeconfig(#[source] kube::config::InferConfigError),

    #[error("unable to create kubernetes client")]
    Client(#[source] kube::Error),

    #[error("failed to list {kind}")]
    Inventory {
        kind: String,
        #[source]
        source: BoxError,
    },

    #[error("unsupported resource kind: {0}")]
    UnsupportedKind(String),

    #[error("failed to open log stream for {name}")]
    StreamOpen {
        name: String,
        #[source]
        source: BoxError,
    },

    #[error("error reading log stream for {name}")]
    StreamRead {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid filter pattern")]
    Pattern(#[from] regex::Error),

    #[error("filter rule has no patterns")]
    EmptyRule,

    #[error("failed to write output")]
    Output(#[source] std::io::Error),

    #[error("task failed")]
    Task(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, TailError>;
