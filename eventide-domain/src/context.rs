//! 执行上下文（ExecutionContext）
//!
//! 每次分发期间可在任意深度读取的环境信息（租户、关联 ID）。
//! 基于 `tokio::task_local!` 实现：
//! - 异步路径使用 `scope`，阻塞路径使用 `sync_scope`；
//! - 作用域结束（包括 panic）时自动恢复为外层值；
//! - 并发任务之间互不可见，`tokio::spawn` 出的新任务不继承上下文。
//!
use crate::event::Event;
use bon::Builder;
use std::future::Future;

tokio::task_local! {
    static CURRENT: ExecutionContext;
}

/// 单次分发的环境信息
#[derive(Builder, Clone, Debug, Default, PartialEq, Eq)]
pub struct ExecutionContext {
    #[builder(into)]
    tenant_id: Option<String>,
    #[builder(into)]
    correlation_id: Option<String>,
}

impl ExecutionContext {
    /// 取事件的租户与关联 ID
    pub fn for_event(event: &Event) -> Self {
        Self {
            tenant_id: Some(event.tenant_id().to_string()),
            correlation_id: event.correlation_id().map(str::to_string),
        }
    }

    pub fn tenant_id(&self) -> Option<&str> {
        self.tenant_id.as_deref()
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    /// 在该上下文中运行异步任务
    pub async fn scope<F>(self, fut: F) -> F::Output
    where
        F: Future,
    {
        CURRENT.scope(self, fut).await
    }

    /// 在该上下文中运行同步闭包
    pub fn sync_scope<R>(self, f: impl FnOnce() -> R) -> R {
        CURRENT.sync_scope(self, f)
    }

    /// 当前上下文；作用域外返回空上下文
    pub fn current() -> Self {
        CURRENT.try_with(Clone::clone).unwrap_or_default()
    }
}

/// 当前租户
pub fn current_tenant() -> Option<String> {
    CURRENT
        .try_with(|ctx| ctx.tenant_id.clone())
        .ok()
        .flatten()
}

/// 当前关联 ID
pub fn current_correlation_id() -> Option<String> {
    CURRENT
        .try_with(|ctx| ctx.correlation_id.clone())
        .ok()
        .flatten()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{AssertUnwindSafe, catch_unwind};
    use std::time::Duration;

    fn ctx(tenant: &str, correlation: &str) -> ExecutionContext {
        ExecutionContext::builder()
            .tenant_id(tenant)
            .correlation_id(correlation)
            .build()
    }

    #[test]
    fn empty_outside_scope() {
        assert_eq!(ExecutionContext::current(), ExecutionContext::default());
        assert!(current_tenant().is_none());
        assert!(current_correlation_id().is_none());
    }

    #[test]
    fn nested_scope_restores_outer_value() {
        ctx("outer", "c-1").sync_scope(|| {
            ctx("inner", "c-2").sync_scope(|| {
                assert_eq!(current_tenant().as_deref(), Some("inner"));
            });
            assert_eq!(current_tenant().as_deref(), Some("outer"));
            assert_eq!(current_correlation_id().as_deref(), Some("c-1"));
        });
    }

    #[test]
    fn reset_after_panic() {
        let result = catch_unwind(AssertUnwindSafe(|| {
            ctx("t-1", "c-1").sync_scope(|| panic!("handler blew up"))
        }));

        assert!(result.is_err());
        assert!(current_tenant().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_tasks_are_isolated() {
        let mut tasks = Vec::new();
        for i in 0..16 {
            let tenant = format!("t-{i}");
            tasks.push(tokio::spawn(ctx(&tenant, &format!("c-{i}")).scope(async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                tokio::task::yield_now().await;
                current_tenant() == Some(tenant)
            })));
        }

        for task in tasks {
            assert!(task.await.unwrap());
        }
    }

    #[tokio::test]
    async fn spawned_task_does_not_inherit() {
        let inherited = ctx("t-1", "c-1")
            .scope(async { tokio::spawn(async { current_tenant() }).await.unwrap() })
            .await;
        assert!(inherited.is_none());
    }
}
