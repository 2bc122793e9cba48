//! feedrelay: relays new articles from the multilingual Pixivision feeds to
//! subscribed chat channels, once per channel.
//!
//! Pipeline: [`feed::FeedPoller`] → [`feed::normalize`] →
//! [`delivery::DeliveryEngine`], which consults a [`storage::Store`] for
//! subscriptions and delivery records and posts through a
//! [`sender::Sender`].

pub mod config;
pub mod delivery;
pub mod feed;
pub mod language;
pub mod model;
pub mod ops;
pub mod present;
pub mod sender;
pub mod service;
pub mod storage;
pub mod util;
