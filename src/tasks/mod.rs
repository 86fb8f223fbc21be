//! 后台定时任务。
//!
//! 启动时调用一次 `spawn_all`，所有任务通过 `tokio::spawn` 分离运行，互不阻塞。

use crate::services::{DistributionService, MembershipService, OrderService};

/// 启动全部后台任务。
///
/// 各任务的处理逻辑在对应 service 中保证幂等，这里只负责调度。
pub fn spawn_all(
    order_service: OrderService,
    distribution_service: DistributionService,
    membership_service: MembershipService,
) {
    // 待支付订单超时关闭（每分钟）
    {
        let svc = order_service.clone();
        tokio::spawn(async move {
            loop {
                match svc.expire_pending_orders().await {
                    Ok(n) if n > 0 => log::info!("Expired pending orders: {n}"),
                    Ok(_) => {}
                    Err(e) => log::error!("Failed to expire pending orders: {e:?}"),
                }
                tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            }
        });
    }

    // 冻结期已满的佣金结算（每10分钟）
    {
        let svc = distribution_service.clone();
        tokio::spawn(async move {
            loop {
                match svc.settle_due_commissions().await {
                    Ok(n) if n > 0 => log::info!("Settled commissions: {n}"),
                    Ok(_) => {}
                    Err(e) => log::error!("Failed to settle commissions: {e:?}"),
                }
                tokio::time::sleep(std::time::Duration::from_secs(600)).await;
            }
        });
    }

    // 会员过期检查（每6小时）
    {
        let svc = membership_service.clone();
        tokio::spawn(async move {
            loop {
                match svc.expire_memberships().await {
                    Ok(n) if n > 0 => log::info!("Expired memberships processed: {n}"),
                    Ok(_) => {}
                    Err(e) => log::error!("Failed to expire memberships: {e:?}"),
                }
                tokio::time::sleep(std::time::Duration::from_secs(6 * 3600)).await;
            }
        });
    }
}
