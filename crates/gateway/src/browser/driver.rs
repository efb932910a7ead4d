//! A single headless browser bound to one session.
//!
//! Grounded on `scottopell-phoenix-ide/src/tools/browser/session.rs` and
//! `tools.rs`: the launch-config chain, the handler-pump task, and wrapping
//! every CDP round trip in `tokio::time::timeout` are all lifted from there.
//! Operations are serialized through an internal page mutex the same way
//! that repo guards its `BrowserSession` — one session, one browser, no
//! concurrent CDP calls racing each other.

use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchKeyEventParams, DispatchKeyEventType, DispatchMouseEventParams, DispatchMouseEventType,
    MouseButton as CdpMouseButton,
};
use chromiumoxide::cdp::browser_protocol::page::{
    CaptureScreenshotFormat, EventScreencastFrame, GetNavigationHistoryParams,
    NavigateToHistoryEntryParams, ScreencastFrameAckParams, StartScreencastParams,
    StopScreencastParams,
};
use chromiumoxide::error::CdpError;
use chromiumoxide::page::ScreenshotParams;
use futures_util::StreamExt;
use tokio::sync::{mpsc, Mutex as AsyncMutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use super::{
    BoundingBox, DriverError, DriverState, ElementDescriptor, Frame, HealthStatus, KeyAction,
    Modifiers, MouseAction, MouseButton, Viewport,
};

const OP_TIMEOUT: Duration = Duration::from_secs(30);
const LAUNCH_TIMEOUT: Duration = Duration::from_secs(30);
const HEALTH_TIMEOUT: Duration = Duration::from_secs(3);
const HEALTH_CACHE_TTL: Duration = Duration::from_secs(10);

fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

async fn with_timeout<T>(
    op: &'static str,
    fut: impl std::future::Future<Output = Result<T, CdpError>>,
) -> Result<T, DriverError> {
    match tokio::time::timeout(OP_TIMEOUT, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(source)) => Err(DriverError::Cdp { op, source }),
        Err(_) => Err(DriverError::Timeout { op, timeout_secs: OP_TIMEOUT.as_secs() }),
    }
}

fn build_err(op: &'static str, message: impl std::fmt::Display) -> DriverError {
    DriverError::Cdp { op, source: CdpError::msg(message.to_string()) }
}

/// Owns the chromiumoxide [`Browser`]/[`Page`] pair for one session and
/// exposes the gateway's Driver contract over it.
pub struct BrowserDriver {
    browser: AsyncMutex<Browser>,
    page: AsyncMutex<chromiumoxide::Page>,
    _handler_task: JoinHandle<()>,
    state: RwLock<DriverState>,
    viewport: Viewport,
    screencast_task: AsyncMutex<Option<JoinHandle<()>>>,
    /// Bitmask of currently-held mouse buttons (CDP `buttons` layout: left=1,
    /// right=2, middle=4), kept so every dispatched event — including moves,
    /// for drags — reports the buttons actually down.
    pressed_buttons: AtomicU8,
    health_cache: AsyncMutex<Option<(Instant, HealthStatus)>>,
}

impl BrowserDriver {
    /// Launch a fresh, isolated browser process for one session.
    ///
    /// Each driver gets its own `user_data_dir` under `temp_root` so that
    /// crashed or killed sessions never share cookies, cache, or a profile
    /// lock with another session's browser.
    #[instrument(skip(temp_root), fields(session_id))]
    pub async fn launch(
        session_id: &str,
        viewport: Viewport,
        temp_root: &std::path::Path,
    ) -> Result<Self, DriverError> {
        let user_data_dir = temp_root.join(format!("session-{session_id}"));
        tokio::fs::create_dir_all(&user_data_dir)
            .await
            .map_err(|e| DriverError::LaunchFailed(e.to_string()))?;

        let config = BrowserConfig::builder()
            .new_headless_mode()
            .no_sandbox()
            .arg("--disable-gpu")
            .arg("--disable-software-rasterizer")
            .arg("--disable-dev-shm-usage")
            .user_data_dir(&user_data_dir)
            .viewport(chromiumoxide::handler::viewport::Viewport {
                width: viewport.width,
                height: viewport.height,
                device_scale_factor: Some(1.0),
                emulating_mobile: false,
                is_landscape: true,
                has_touch: false,
            })
            .build()
            .map_err(DriverError::LaunchFailed)?;

        let (browser, mut handler) = tokio::time::timeout(LAUNCH_TIMEOUT, Browser::launch(config))
            .await
            .map_err(|_| DriverError::Timeout { op: "launch", timeout_secs: LAUNCH_TIMEOUT.as_secs() })?
            .map_err(|e| DriverError::LaunchFailed(e.to_string()))?;

        let handler_task = tokio::task::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    warn!(error = %err, "browser handler event error");
                }
            }
        });

        let page = with_timeout("launch", browser.new_page("about:blank")).await?;

        Ok(Self {
            browser: AsyncMutex::new(browser),
            page: AsyncMutex::new(page),
            _handler_task: handler_task,
            state: RwLock::new(DriverState::Ready),
            viewport,
            screencast_task: AsyncMutex::new(None),
            pressed_buttons: AtomicU8::new(0),
            health_cache: AsyncMutex::new(None),
        })
    }

    pub async fn state(&self) -> DriverState {
        *self.state.read().await
    }

    #[instrument(skip(self))]
    pub async fn navigate(&self, url: &str) -> Result<(), DriverError> {
        let page = self.page.lock().await;
        with_timeout("navigate", page.goto(url)).await?;
        with_timeout("navigate", page.wait_for_navigation()).await?;
        Ok(())
    }

    /// Resolve the history entry id `offset` steps away from the current
    /// one (negative for back, positive for forward).
    async fn history_entry(
        &self,
        page: &chromiumoxide::Page,
        op: &'static str,
        offset: i32,
    ) -> Result<i64, DriverError> {
        let history = with_timeout(op, page.execute(GetNavigationHistoryParams::default())).await?;
        let target = history.result.current_index as i32 + offset;
        if target < 0 {
            return Err(build_err(op, "no such history entry"));
        }
        history
            .result
            .entries
            .get(target as usize)
            .map(|entry| entry.id)
            .ok_or_else(|| build_err(op, "no such history entry"))
    }

    #[instrument(skip(self))]
    pub async fn back(&self) -> Result<(), DriverError> {
        let page = self.page.lock().await;
        let entry_id = self.history_entry(&page, "back", -1).await?;
        with_timeout("back", page.execute(NavigateToHistoryEntryParams::new(entry_id))).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn forward(&self) -> Result<(), DriverError> {
        let page = self.page.lock().await;
        let entry_id = self.history_entry(&page, "forward", 1).await?;
        with_timeout("forward", page.execute(NavigateToHistoryEntryParams::new(entry_id))).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn reload(&self) -> Result<(), DriverError> {
        let page = self.page.lock().await;
        with_timeout("reload", page.reload()).await?;
        Ok(())
    }

    /// The page's current URL, used after a navigation completes to record
    /// its destination (back/forward/reload don't otherwise reveal it).
    #[instrument(skip(self))]
    pub async fn current_url(&self) -> Result<Option<String>, DriverError> {
        let page = self.page.lock().await;
        with_timeout("url", page.url()).await
    }

    #[instrument(skip(self), fields(x, y))]
    pub async fn mouse(
        &self,
        action: MouseAction,
        button: MouseButton,
        x: f64,
        y: f64,
    ) -> Result<(), DriverError> {
        let cdp_button = match button {
            MouseButton::Left => CdpMouseButton::Left,
            MouseButton::Right => CdpMouseButton::Right,
            MouseButton::Middle => CdpMouseButton::Middle,
        };
        let bit = button.bit();
        match action {
            MouseAction::Move => {
                self.dispatch_mouse_event(DispatchMouseEventType::MouseMoved, cdp_button, x, y, None).await
            }
            MouseAction::Down => {
                self.dispatch_mouse_event(DispatchMouseEventType::MousePressed, cdp_button, x, y, Some((bit, true)))
                    .await
            }
            MouseAction::Up => {
                self.dispatch_mouse_event(DispatchMouseEventType::MouseReleased, cdp_button, x, y, Some((bit, false)))
                    .await
            }
            MouseAction::Click => {
                self.dispatch_mouse_event(DispatchMouseEventType::MousePressed, cdp_button, x, y, Some((bit, true)))
                    .await?;
                self.dispatch_mouse_event(DispatchMouseEventType::MouseReleased, cdp_button, x, y, Some((bit, false)))
                    .await
            }
        }
    }

    /// Dispatches one `Input.dispatchMouseEvent`. `press` is `Some((bit,
    /// true))` for a button going down — ORed into the pressed-buttons mask
    /// before the event is built — or `Some((bit, false))` for a button
    /// going up, which clears the bit first; `None` for a move, which
    /// reports whatever buttons are already held.
    async fn dispatch_mouse_event(
        &self,
        event_type: DispatchMouseEventType,
        cdp_button: CdpMouseButton,
        x: f64,
        y: f64,
        press: Option<(u8, bool)>,
    ) -> Result<(), DriverError> {
        if let Some((bit, going_down)) = press {
            if going_down {
                self.pressed_buttons.fetch_or(bit, Ordering::Relaxed);
            } else {
                self.pressed_buttons.fetch_and(!bit, Ordering::Relaxed);
            }
        }
        let buttons_mask = self.pressed_buttons.load(Ordering::Relaxed);
        let page = self.page.lock().await;
        let params = DispatchMouseEventParams::builder()
            .r#type(event_type)
            .x(x)
            .y(y)
            .button(cdp_button)
            .buttons(buttons_mask as i64)
            .click_count(1)
            .build()
            .map_err(|e| build_err("mouse", e))?;
        with_timeout("mouse", page.execute(params)).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn scroll(&self, x: f64, y: f64, delta_x: f64, delta_y: f64) -> Result<(), DriverError> {
        let page = self.page.lock().await;
        let params = DispatchMouseEventParams::builder()
            .r#type(DispatchMouseEventType::MouseWheel)
            .x(x)
            .y(y)
            .delta_x(delta_x)
            .delta_y(delta_y)
            .build()
            .map_err(|e| build_err("scroll", e))?;
        with_timeout("scroll", page.execute(params)).await?;
        Ok(())
    }

    /// `text` is the wire-level input text, independent of `name`: its
    /// non-emptiness (not whether `name` happens to resolve to a single
    /// character) decides `keyDown` vs `rawKeyDown`. When `text` carries
    /// more than one character — e.g. an IME commit or autofill — one CDP
    /// event is dispatched per character, matching chromiumoxide's own
    /// `type_str` helper.
    #[instrument(skip(self, text))]
    pub async fn key(&self, action: KeyAction, name: &str, text: Option<&str>, modifiers: Modifiers) -> Result<(), DriverError> {
        let resolved = super::resolve_key(name).ok_or_else(|| build_err("key", format!("unrecognized key {name}")))?;
        let text = text.filter(|t| !t.is_empty());

        let chunks: Vec<Option<String>> = match (action, text) {
            (KeyAction::Down, Some(t)) if t.chars().count() > 1 => {
                t.chars().map(|c| Some(c.to_string())).collect()
            }
            (KeyAction::Down, Some(t)) => vec![Some(t.to_owned())],
            _ => vec![None],
        };

        for chunk in chunks {
            let event_type = match action {
                KeyAction::Down if chunk.is_some() => DispatchKeyEventType::KeyDown,
                KeyAction::Down => DispatchKeyEventType::RawKeyDown,
                KeyAction::Up => DispatchKeyEventType::KeyUp,
            };
            let mut builder = DispatchKeyEventParams::builder()
                .r#type(event_type)
                .code(resolved.code.clone())
                .key(resolved.key.clone())
                .windows_virtual_key_code(resolved.windows_virtual_key_code)
                .native_virtual_key_code(resolved.windows_virtual_key_code)
                .modifiers(modifiers.bitmask());
            if let Some(chunk_text) = chunk {
                builder = builder.text(chunk_text);
            }
            let params = builder.build().map_err(|e| build_err("key", e))?;
            let page = self.page.lock().await;
            with_timeout("key", page.execute(params)).await?;
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn element_at(&self, x: f64, y: f64) -> Result<Option<ElementDescriptor>, DriverError> {
        let page = self.page.lock().await;
        let script = format!(
            "(() => {{
                const el = document.elementFromPoint({x}, {y});
                if (!el) return null;
                const r = el.getBoundingClientRect();
                return {{
                    tag: el.tagName.toLowerCase(),
                    id: el.id || null,
                    classes: Array.from(el.classList),
                    role: el.getAttribute('role'),
                    testId: el.getAttribute('data-testid'),
                    label: el.getAttribute('aria-label'),
                    name: el.getAttribute('name'),
                    placeholder: el.getAttribute('placeholder'),
                    box: {{ x: r.x, y: r.y, width: r.width, height: r.height }},
                }};
            }})()"
        );
        let evaluated = with_timeout("elementAt", page.evaluate(script)).await?;
        let value = evaluated
            .into_value::<Option<ElementAtResult>>()
            .map_err(|e| build_err("elementAt", e))?;
        Ok(value.map(Into::into))
    }

    #[instrument(skip(self))]
    pub async fn screenshot(&self) -> Result<Vec<u8>, DriverError> {
        let page = self.page.lock().await;
        let params = ScreenshotParams::builder().build();
        with_timeout("screenshot", page.screenshot(params)).await
    }

    #[instrument(skip(self))]
    pub async fn screenshot_with_highlight(&self, selector: &str) -> Result<Vec<u8>, DriverError> {
        let page = self.page.lock().await;
        let element = with_timeout("screenshot", page.find_element(selector)).await?;
        with_timeout("screenshot", element.screenshot(CaptureScreenshotFormat::Png)).await
    }

    #[instrument(skip(self))]
    pub async fn click_selector(&self, selector: &str) -> Result<(), DriverError> {
        let page = self.page.lock().await;
        let element = with_timeout("click", page.find_element(selector)).await?;
        with_timeout("click", element.click()).await?;
        Ok(())
    }

    #[instrument(skip(self, text))]
    pub async fn type_into_selector(&self, selector: &str, text: &str) -> Result<(), DriverError> {
        let page = self.page.lock().await;
        let element = with_timeout("type", page.find_element(selector)).await?;
        with_timeout("type", element.type_str(text)).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn resize(&self, width: u32, height: u32) -> Result<(), DriverError> {
        let page = self.page.lock().await;
        let params = SetDeviceMetricsOverrideParams::builder()
            .width(width as i64)
            .height(height as i64)
            .device_scale_factor(1.0)
            .mobile(false)
            .build()
            .map_err(|e| build_err("resize", e))?;
        with_timeout("resize", page.execute(params)).await?;
        Ok(())
    }

    /// Start streaming screencast frames at the configured quality and FPS
    /// cap. Frames arrive on `tx`; each frame is acked back to CDP as soon
    /// as it's handed off so the pipe never backs up.
    #[instrument(skip(self, tx))]
    pub async fn start_screencast(
        &self,
        quality: u8,
        max_fps: u32,
        tx: mpsc::Sender<Frame>,
    ) -> Result<(), DriverError> {
        {
            let mut state = self.state.write().await;
            if *state == DriverState::Screencasting {
                return Ok(());
            }
            *state = DriverState::Screencasting;
        }

        let page = self.page.lock().await;
        let params = StartScreencastParams::builder()
            .format(CaptureScreenshotFormat::Jpeg)
            .quality(quality as i64)
            .max_width(self.viewport.width as i64)
            .max_height(self.viewport.height as i64)
            .build();
        with_timeout("startScreencast", page.execute(params)).await?;

        let mut frames = page
            .event_listener::<EventScreencastFrame>()
            .await
            .map_err(|e| DriverError::Cdp { op: "startScreencast", source: e })?;
        // chromiumoxide's Page is a thin Arc handle; cloning it into the pump
        // task is cheap and lets acks flow without holding the outer lock.
        let ack_page = page.clone();
        drop(page);

        // CDP's own `every_nth_frame` assumes a fixed ~60Hz capture rate and
        // skips by ordinal, which drifts under a bursty repaint rate. Gate on
        // elapsed time instead so no two forwarded frames are closer than the
        // requested interval, however irregularly CDP delivers them.
        let min_frame_gap = Duration::from_millis(1000 / u64::from(max_fps.max(1)));
        let task = tokio::task::spawn(async move {
            let mut last_forwarded: Option<Instant> = None;
            while let Some(event) = frames.next().await {
                let session_id = event.session_id;
                let now = Instant::now();
                let due = last_forwarded.map(|at| now.duration_since(at) >= min_frame_gap).unwrap_or(true);
                if due {
                    let frame = Frame { jpeg_bytes: event.data.as_bytes().to_vec(), timestamp_ms: now_ms() };
                    if tx.send(frame).await.is_err() {
                        break;
                    }
                    last_forwarded = Some(now);
                }
                let ack = ScreencastFrameAckParams::new(session_id);
                if let Err(err) = ack_page.execute(ack).await {
                    debug!(error = %err, "screencast frame ack failed");
                }
            }
        });
        *self.screencast_task.lock().await = Some(task);
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn stop_screencast(&self) -> Result<(), DriverError> {
        if let Some(task) = self.screencast_task.lock().await.take() {
            task.abort();
        }
        let page = self.page.lock().await;
        with_timeout("stopScreencast", page.execute(StopScreencastParams::default())).await?;
        *self.state.write().await = DriverState::Ready;
        Ok(())
    }

    /// Probe the underlying browser process. Called on a fixed interval by
    /// the session manager's health loop. Results are cached for
    /// `HEALTH_CACHE_TTL` so a burst of callers within that window doesn't
    /// each force a fresh CDP round trip.
    #[instrument(skip(self))]
    pub async fn health(&self) -> HealthStatus {
        {
            let cache = self.health_cache.lock().await;
            if let Some((checked_at, status)) = *cache {
                if checked_at.elapsed() < HEALTH_CACHE_TTL {
                    return status;
                }
            }
        }
        let status = {
            let page = self.page.lock().await;
            match tokio::time::timeout(HEALTH_TIMEOUT, page.evaluate("1")).await {
                Ok(Ok(_)) => HealthStatus::Healthy,
                Ok(Err(err)) => {
                    debug!(error = %err, "health probe failed");
                    HealthStatus::Unhealthy
                }
                Err(_) => HealthStatus::Unhealthy,
            }
        };
        *self.health_cache.lock().await = Some((Instant::now(), status));
        status
    }

    #[instrument(skip(self))]
    pub async fn close(&self) -> Result<(), DriverError> {
        *self.state.write().await = DriverState::Closing;
        if let Some(task) = self.screencast_task.lock().await.take() {
            task.abort();
        }
        let mut browser = self.browser.lock().await;
        let _ = browser.close().await;
        let _ = browser.wait().await;
        *self.state.write().await = DriverState::Closed;
        Ok(())
    }
}

#[derive(Debug, serde::Deserialize)]
struct ElementAtResult {
    tag: String,
    id: Option<String>,
    classes: Vec<String>,
    role: Option<String>,
    #[serde(rename = "testId")]
    test_id: Option<String>,
    label: Option<String>,
    name: Option<String>,
    placeholder: Option<String>,
    #[serde(rename = "box")]
    bounding_box: BoundingBoxResult,
}

#[derive(Debug, serde::Deserialize)]
struct BoundingBoxResult {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
}

impl From<ElementAtResult> for ElementDescriptor {
    fn from(r: ElementAtResult) -> Self {
        Self {
            tag: r.tag,
            id: r.id,
            classes: r.classes,
            role: r.role,
            test_id: r.test_id,
            label: r.label,
            name: r.name,
            placeholder: r.placeholder,
            bounding_box: BoundingBox {
                x: r.bounding_box.x,
                y: r.bounding_box.y,
                width: r.bounding_box.width,
                height: r.bounding_box.height,
            },
        }
    }
}

#[cfg(test)]
#[path = "driver_tests.rs"]
mod tests;
