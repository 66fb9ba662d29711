//! File-mode and live sessions over the synthetic backend

use framecap_core::{PixelFormat, PropertyName, Provider, ProviderConfig, SyntheticSource};
use std::thread;
use std::time::Duration;

fn small_provider(source: SyntheticSource, config: ProviderConfig) -> Provider {
    let provider = Provider::with_config(Box::new(source), config);
    assert!(provider.set(PropertyName::Width, 16.0));
    assert!(provider.set(PropertyName::Height, 8.0));
    provider
}

#[test]
fn test_file_mode_delivers_every_frame_in_order() {
    let provider = small_provider(SyntheticSource::file(40), ProviderConfig::default());
    provider.open("clip.mp4").unwrap();
    assert!(provider.is_file_mode());
    provider.start().unwrap();

    let mut indices = Vec::new();
    while let Some(frame) = provider.grab(5_000) {
        indices.push(frame.frame_index());
        // Slow consumer
        if indices.len() % 8 == 0 {
            thread::sleep(Duration::from_millis(20));
        }
        assert!(provider.queue_stats().queued <= 3);
    }

    assert_eq!(indices, (0..40).collect::<Vec<u64>>());
    assert_eq!(provider.queue_stats().evicted, 0);
    provider.stop().unwrap();
}

#[test]
fn test_file_properties() {
    let provider = small_provider(SyntheticSource::file(45), ProviderConfig::default());
    assert!(provider.get(PropertyName::FrameCount).is_nan());

    provider.open("clip.mp4").unwrap();
    assert_eq!(provider.get(PropertyName::FrameCount), 45.0);
    assert_eq!(provider.get(PropertyName::Duration), 1.5);
    assert!(!provider.set(PropertyName::Duration, 3.0));

    // Seeks past the end are clamped to the last frame
    assert!(provider.set(PropertyName::CurrentTime, 100.0));
    assert_eq!(provider.get(PropertyName::CurrentFrameIndex), 44.0);
    assert!(provider.set(PropertyName::CurrentFrameIndex, 15.0));
    assert_eq!(provider.get(PropertyName::CurrentTime), 0.5);

    assert_eq!(provider.get(PropertyName::PlaybackSpeed), 0.0);
    assert!(!provider.set(PropertyName::PlaybackSpeed, -1.0));
    assert!(provider.set(PropertyName::PlaybackSpeed, 2.0));
    assert_eq!(provider.get(PropertyName::PlaybackSpeed), 2.0);
}

#[test]
fn test_seek_before_start_keeps_session_indices() {
    let provider = small_provider(SyntheticSource::file(20), ProviderConfig::default());
    provider.open("clip.mp4").unwrap();
    assert!(provider.set(PropertyName::CurrentFrameIndex, 15.0));
    provider.start().unwrap();

    let frames: Vec<_> = std::iter::from_fn(|| provider.grab(5_000)).collect();
    assert_eq!(frames.len(), 5);
    assert_eq!(frames[0].frame_index(), 0);
    // Timestamps follow the media position: frame 15 at 30 fps
    assert_eq!(frames[0].timestamp_ns(), 500_000_000);
}

#[test]
fn test_live_synthetic_source() {
    let provider = small_provider(SyntheticSource::live(), ProviderConfig::default());
    assert!(provider.set(PropertyName::FrameRate, 200.0));
    assert!(provider.set(PropertyName::PixelFormatOutput, f64::from(PixelFormat::BGRA32.bits())));
    assert_eq!(provider.find_device_names(), vec!["Synthetic Camera".to_string()]);
    assert!(provider.get(PropertyName::Duration).is_nan());

    provider.open("").unwrap();
    provider.start().unwrap();

    let mut last = None;
    for _ in 0..5 {
        let frame = provider.grab(2_000).expect("live frame");
        assert_eq!(frame.format(), PixelFormat::BGRA32);
        assert_eq!((frame.width(), frame.height()), (16, 8));
        assert_eq!(frame.plane(0)[3], 0xff);
        assert!(last.map_or(true, |last| frame.frame_index() > last));
        last = Some(frame.frame_index());
    }

    provider.close();
    assert!(!provider.is_opened());
    assert!(provider.grab(0).is_none());
}
