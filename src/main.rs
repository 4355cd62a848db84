use std::io::Write;

use user_insight::app::{self, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    std::panic::set_hook(Box::new(|panic_info| {
        let payload = panic_info.payload();
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            s
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s
        } else {
            "Unknown panic payload"
        };

        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "Unknown location".to_string());

        eprintln!("[PANIC] 用户任务异常");
        eprintln!("位置: {}", location);
        eprintln!("原因: {}", message);
        eprintln!(
            "时间: {}",
            chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
        );

        tracing::error!(event = "panic.raised", location = %location, reason = %message);

        // 单个用户的 panic 不会终止批处理，只追加到运行时日志
        let panic_msg = format!(
            "PANIC OCCURRED\nLocation: {}\nReason: {}\nTime: {}\n\n",
            location,
            message,
            chrono::Utc::now()
        );
        if std::fs::create_dir_all("./logs").is_ok() {
            let panic_file = format!(
                "./logs/panic-{}.log",
                chrono::Utc::now().format("%Y%m%d-%H%M%S")
            );
            if let Err(e) = std::fs::write(&panic_file, &panic_msg) {
                eprintln!("[WARN] 无法写入panic日志: {}", e);
            }
        }

        std::io::stderr().flush().ok();
    }));

    let command = match Command::parse(std::env::args().skip(1)) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(2);
        }
    };

    if let Err(e) = app::start(command).await {
        eprintln!("[FATAL] {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
