//! tracing 日志初始化，wasm 下输出到浏览器控制台。

use std::sync::Once;

use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// 安装全局日志订阅者，重复调用无效。过滤规则读取 `RUST_LOG`，缺省为 info。
pub fn init_logging() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_ansi(false);

        #[cfg(target_arch = "wasm32")]
        let result = builder
            .without_time()
            .with_writer(console::ConsoleWriter::default)
            .try_init();
        #[cfg(not(target_arch = "wasm32"))]
        let result = builder.with_writer(std::io::stderr).try_init();

        if result.is_err() {
            tracing::debug!("a global subscriber is already installed");
        }
    });
}

#[cfg(target_arch = "wasm32")]
mod console {
    use std::io::{self, Write};

    /// 缓冲一条日志，释放时整行写入 `console.log`。
    #[derive(Default)]
    pub struct ConsoleWriter {
        buffer: Vec<u8>,
    }

    impl Write for ConsoleWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.buffer.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            if !self.buffer.is_empty() {
                let line = String::from_utf8_lossy(&self.buffer);
                web_sys::console::log_1(&line.trim_end().into());
                self.buffer.clear();
            }
            Ok(())
        }
    }

    impl Drop for ConsoleWriter {
        fn drop(&mut self) {
            let _ = self.flush();
        }
    }
}
