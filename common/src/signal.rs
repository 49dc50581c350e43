//! 协作式取消信号
//!
//! [`AbortController`] 持有发送端，[`AbortSignal`] 可以随意克隆并传给每个入口函数。
//! 一旦触发，就不允许再发起新的网络请求，进行中的请求结果也要丢弃。

use std::future::Future;

use tokio::sync::watch;

use crate::error::{ResolveError, ResolveResult};

/// 取消信号的发送端
#[derive(Debug)]
pub struct AbortController {
    tx: watch::Sender<bool>,
}

impl AbortController {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    pub fn signal(&self) -> AbortSignal {
        AbortSignal {
            rx: self.tx.subscribe(),
        }
    }

    pub fn abort(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_aborted(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for AbortController {
    fn default() -> Self {
        Self::new()
    }
}

/// 取消信号的接收端
#[derive(Debug, Clone)]
pub struct AbortSignal {
    rx: watch::Receiver<bool>,
}

impl AbortSignal {
    /// 永远不会触发的信号
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_aborted(&self) -> bool {
        *self.rx.borrow()
    }

    /// 已取消时返回 [`ResolveError::Canceled`]
    pub fn check(&self) -> ResolveResult<()> {
        if self.is_aborted() {
            Err(ResolveError::Canceled)
        } else {
            Ok(())
        }
    }

    /// 等待信号触发；发送端已丢弃且未触发时永远挂起
    pub async fn aborted(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|aborted| *aborted).await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    /// 在信号保护下执行一个异步操作
    ///
    /// 执行前已取消则不会开始；执行中取消会立即放弃；
    /// 完成时若信号已触发，结果会被丢弃。
    pub async fn guard<T, F>(&self, fut: F) -> ResolveResult<T>
    where
        F: Future<Output = ResolveResult<T>>,
    {
        self.check()?;

        let result = tokio::select! {
            biased;
            _ = self.aborted() => return Err(ResolveError::Canceled),
            result = fut => result,
        };

        self.check()?;
        result
    }
}
