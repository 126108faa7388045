pub mod cache;
pub mod config;
pub mod decode;
pub mod error;
pub mod events;
pub mod media;
pub mod prefetch;
pub mod scan;
pub mod surfaces;
#[cfg(any(test, feature = "testkit"))]
pub mod testkit;
pub mod tasks {
    pub mod slideshow;
}
