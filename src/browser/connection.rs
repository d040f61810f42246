use anyhow::Result;
use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use tokio::time::sleep;
use tracing::{debug, error, info};

use crate::error::BrowserError;

/// 连接到调试端口上已运行的浏览器并获取考试页面
///
/// 优先复用地址以 `exam_url` 开头的已有标签页（操作员可能已经登录），
/// 找不到时新开一个页面并导航过去。
pub async fn connect_to_browser_and_page(port: u16, exam_url: Option<&str>) -> Result<(Browser, Page)> {
    let browser_url = format!("http://localhost:{}", port);
    info!("正在连接到浏览器: {}", browser_url);

    let (browser, mut handler) = Browser::connect(&browser_url).await.map_err(|e| {
        error!("连接浏览器失败: {}", e);
        BrowserError::connection_failed(port, e)
    })?;
    debug!("浏览器连接成功");

    // 在后台处理浏览器事件
    tokio::spawn(async move {
        while let Some(h) = handler.next().await {
            if h.is_err() {
                break;
            }
        }
    });

    // 等待浏览器状态同步
    sleep(tokio::time::Duration::from_millis(300)).await;

    let pages = browser.pages().await?;
    debug!("获取到 {} 个页面", pages.len());

    if let Some(url) = exam_url {
        for p in pages.iter() {
            if let Ok(Some(page_url)) = p.url().await {
                debug!("检查页面: {}", page_url);
                if page_url.starts_with(url) {
                    info!("✓ 复用已打开的考试页面: {}", page_url);
                    return Ok((browser, p.clone()));
                }
            }
        }
        debug!("未找到匹配的页面，将创建新页面");
    }

    let page = browser.new_page("about:blank").await.map_err(|e| {
        error!("创建新页面失败: {}", e);
        e
    })?;
    if let Some(url) = exam_url {
        page.goto(url).await.map_err(|e| {
            error!("导航到 {} 失败: {}", url, e);
            BrowserError::navigation_failed(url, e)
        })?;
        info!("已导航到: {}", url);
    }

    Ok((browser, page))
}
