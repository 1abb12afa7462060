use crate::types::TrayCommand;

use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, Sender};
use tao::event_loop::EventLoopProxy;
use thiserror::Error;
use tray_icon::{
    menu::{Menu, MenuEvent, MenuId, MenuItem},
    Icon, TrayIcon, TrayIconBuilder,
};

pub const TITLE: &str = "WPaper";
pub const NEXT_ID: &str = "next";
pub const QUIT_ID: &str = "quit";
/// Shown until the scheduler publishes a fire time.
pub const GREETING: &str = "WPaper: pick Next for a new wallpaper";

/// Where background threads post requests for the thread that owns the tray icon.
pub trait TraySink: Send + Sync {
    /// Returns false once the tray's event loop has gone away.
    fn post(&self, command: TrayCommand) -> bool;
}

impl TraySink for EventLoopProxy<TrayCommand> {
    fn post(&self, command: TrayCommand) -> bool {
        self.send_event(command).is_ok()
    }
}

#[derive(Debug, Error)]
pub enum TrayError {
    #[error("Menu error: {0}")]
    Menu(#[from] tray_icon::menu::Error),

    #[error("Failed to create icon: {0}")]
    Icon(#[from] tray_icon::BadIcon),

    #[error("Failed to build tray icon: {0}")]
    Tray(#[from] tray_icon::Error),
}

/// Fans menu events out so every item gets its own click stream.
#[derive(Default)]
pub struct MenuRouter {
    routes: HashMap<MenuId, Sender<()>>,
}

impl MenuRouter {
    pub fn subscribe(&mut self, id: MenuId) -> Receiver<()> {
        let (tx, rx) = mpsc::channel();
        self.routes.insert(id, tx);
        rx
    }

    /// Returns false for unknown items and for items whose listener has gone away.
    pub fn route(&self, id: &MenuId) -> bool {
        match self.routes.get(id) {
            Some(tx) => tx.send(()).is_ok(),
            None => false,
        }
    }

    pub fn install(self) {
        MenuEvent::set_event_handler(Some(move |event: MenuEvent| {
            if !self.route(&event.id) {
                tracing::debug!("Unhandled menu event {:?}", event.id);
            }
        }));
    }
}

/// Click streams for the two menu entries.
pub struct MenuClicks {
    pub next: Receiver<()>,
    pub quit: Receiver<()>,
}

pub struct TrayManager {
    tray_icon: TrayIcon,
}

impl TrayManager {
    /// Must run on the event loop thread once the loop has started.
    pub fn new() -> Result<(Self, MenuClicks), TrayError> {
        let tray_menu = Menu::new();
        let next_item = MenuItem::with_id(NEXT_ID, "Next", true, None);
        let quit_item = MenuItem::with_id(QUIT_ID, "Quit", true, None);
        tray_menu.append(&next_item)?;
        tray_menu.append(&quit_item)?;

        let mut router = MenuRouter::default();
        let clicks = MenuClicks {
            next: router.subscribe(next_item.id().clone()),
            quit: router.subscribe(quit_item.id().clone()),
        };
        router.install();

        let tray_icon = TrayIconBuilder::new()
            .with_menu(Box::new(tray_menu))
            .with_title(TITLE)
            .with_tooltip(GREETING)
            .with_icon(Self::generate_icon()?)
            .build()?;
        tracing::info!("Tray icon built");

        Ok((Self { tray_icon }, clicks))
    }

    pub fn set_tooltip(&self, text: &str) {
        if let Err(e) = self.tray_icon.set_tooltip(Some(text)) {
            tracing::warn!("Failed to set tooltip: {}", e);
        }
    }

    fn generate_icon() -> Result<Icon, TrayError> {
        let size: u32 = 32;
        let mut rgba = Vec::with_capacity((size * size * 4) as usize);

        // Sky gradient, darker towards the bottom
        for y in 0..size {
            let shade = (255 - y * 4) as u8;
            for _ in 0..size {
                rgba.extend_from_slice(&[40, shade / 2, shade, 255]);
            }
        }

        Ok(Icon::from_rgba(rgba, size, size)?)
    }
}
