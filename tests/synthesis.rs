use resynthesizer as rs;
use rs::{CancelToken, Error, GuidanceMaps, Mask, Parameters, PixelMap, ProgressUpdate, Session};

fn checkerboard(size: u32) -> PixelMap {
    PixelMap::from_fn(size, size, 1, |x, y, px| {
        px[0] = if (x + y) % 2 == 0 { 0 } else { 255 }
    })
}

/// Diagonal color bands, enough structure for matches to be told apart
fn bands(width: u32, height: u32) -> PixelMap {
    PixelMap::from_fn(width, height, 3, |x, y, px| {
        let v = ((x + 2 * y) % 6) as u8;
        px.copy_from_slice(&[v * 40, 255 - v * 40, (v % 2) * 200]);
    })
}

/// Deterministic, structureless colors
fn noise(width: u32, height: u32) -> PixelMap {
    PixelMap::from_fn(width, height, 3, |x, y, px| {
        let h = x.wrapping_mul(374_761_393) ^ y.wrapping_mul(668_265_263);
        let h = h.wrapping_mul(1_274_126_177);
        px.copy_from_slice(&[(h >> 24) as u8, (h >> 16) as u8, (h >> 8) as u8]);
    })
}

fn base_params() -> Parameters {
    Parameters {
        neighbours: 8,
        trials: 20,
        max_passes: 3,
        min_improvement: 0.0,
        seed: 7,
        max_thread_count: Some(1),
        ..Parameters::default()
    }
}

fn run(
    target: &PixelMap,
    target_mask: &Mask,
    corpus: &PixelMap,
    params: Parameters,
) -> rs::Synthesized {
    Session::builder()
        .target(target)
        .target_mask(target_mask)
        .corpus(corpus)
        .parameters(params)
        .build()
        .unwrap()
        .run(None)
        .unwrap()
}

#[test]
fn checkerboard_scenario() {
    let target = PixelMap::new(4, 4, 1);
    let target_mask = Mask::all(4, 4);
    let corpus = checkerboard(4);
    let corpus_mask = Mask::all(4, 4);

    let params = Parameters {
        neighbours: 2,
        max_passes: 1,
        seed: 42,
        ..Parameters::default()
    };

    let first =
        rs::synthesize(&target, &target_mask, &corpus, &corpus_mask, None, &params).unwrap();
    let second =
        rs::synthesize(&target, &target_mask, &corpus, &corpus_mask, None, &params).unwrap();

    assert_eq!(first, second);
    assert_eq!(first.dims(), target.dims());
    assert!(first.as_raw().iter().all(|&v| v == 0 || v == 255));

    // Inputs are borrowed, never written
    assert_eq!(target_mask, Mask::all(4, 4));
    assert_eq!(corpus_mask, Mask::all(4, 4));
    assert!(target.as_raw().iter().all(|&v| v == 0));
}

#[test]
fn deterministic_across_runs_and_threads() {
    let target = PixelMap::new(40, 40, 3);
    let mask = Mask::all(40, 40);
    let corpus = bands(32, 32);

    let single = run(&target, &mask, &corpus, base_params());
    let again = run(&target, &mask, &corpus, base_params());
    let threaded = run(
        &target,
        &mask,
        &corpus,
        Parameters {
            max_thread_count: Some(4),
            ..base_params()
        },
    );

    assert_eq!(single.image(), again.image());
    assert_eq!(single.image(), threaded.image());
    assert_eq!(single.sources(), threaded.sources());
    assert_eq!(single.scores(), threaded.scores());

    let other_seed = run(
        &target,
        &mask,
        &corpus,
        Parameters {
            seed: 8,
            ..base_params()
        },
    );
    assert_ne!(single.sources(), other_seed.sources());
}

#[test]
fn scores_never_get_worse() {
    let target = PixelMap::new(24, 24, 3);
    let mask = Mask::all(24, 24);
    let corpus = bands(20, 20);

    // Later passes start from the exact state earlier passes ended in
    let results: Vec<_> = (1..=4)
        .map(|passes| {
            run(
                &target,
                &mask,
                &corpus,
                Parameters {
                    max_passes: passes,
                    ..base_params()
                },
            )
        })
        .collect();

    for pair in results.windows(2) {
        assert_eq!(pair[1].passes(), pair[0].passes() + 1);

        for (before, after) in pair[0].scores().iter().zip(pair[1].scores()) {
            let (before, after) = (before.unwrap(), after.unwrap());
            assert!(after <= before, "{} got worse, now {}", before, after);
        }
    }
}

#[test]
fn respects_masks() {
    let target = PixelMap::from_fn(16, 16, 3, |x, y, px| {
        px.copy_from_slice(&[x as u8, y as u8, 99]);
    });
    let target_mask = Mask::from_fn(16, 16, |x, y| {
        if (4..12).contains(&x) && (4..12).contains(&y) {
            255
        } else {
            0
        }
    });

    let corpus = bands(16, 16);
    let corpus_mask = Mask::from_fn(16, 16, |x, _| if x >= 8 { 255 } else { 0 });

    let out = Session::builder()
        .target(&target)
        .target_mask(&target_mask)
        .corpus(&corpus)
        .corpus_mask(&corpus_mask)
        .parameters(base_params())
        .build()
        .unwrap()
        .run(None)
        .unwrap();

    for y in 0..16 {
        for x in 0..16 {
            let i = (y * 16 + x) as usize;
            if target_mask.is_in(x, y) {
                let (sx, sy) = out.sources()[i].expect("selected pixels get a source");
                assert!(corpus_mask.is_in(sx, sy));
                assert_eq!(out.image().get(x, y), corpus.get(sx, sy));
            } else {
                assert_eq!(out.sources()[i], None);
                assert_eq!(out.image().get(x, y), target.get(x, y));
            }
        }
    }
}

#[test]
fn tiling_wraps_both_axes() {
    let out = Session::builder()
        .target(&PixelMap::new(12, 10, 3))
        .corpus(&bands(16, 16))
        .parameters(base_params())
        .tiling(true, true)
        .build()
        .unwrap()
        .run(None)
        .unwrap()
        .into_pixel_map();

    let edges = rs::Edges::tiling(true, true);
    for y in 0..10 {
        assert_eq!(out.get_resolved(-1, y as i32, edges), out.get(11, y));
        assert_eq!(out.get_resolved(12, y as i32, edges), out.get(0, y));
    }
    for x in 0..12 {
        assert_eq!(out.get_resolved(x as i32, -1, edges), out.get(x, 9));
    }
}

#[test]
fn empty_inputs() {
    let img = bands(8, 8);
    let all = Mask::all(8, 8);
    let none = Mask::none(8, 8);
    let params = base_params();

    assert!(matches!(
        rs::synthesize(&img, &all, &img, &none, None, &params),
        Err(Error::EmptyCorpus)
    ));
    assert!(matches!(
        rs::synthesize(&img, &none, &img, &all, None, &params),
        Err(Error::EmptyTarget)
    ));
    // An empty corpus is reported first
    assert!(matches!(
        rs::synthesize(&img, &none, &img, &none, None, &params),
        Err(Error::EmptyCorpus)
    ));
}

#[test]
fn guidance_steers_sources() {
    // A corpus whose halves look identical, told apart only by guidance
    let corpus = PixelMap::from_fn(16, 8, 1, |x, y, px| px[0] = ((x + y) % 3 * 100) as u8);
    let input = PixelMap::from_fn(16, 8, 1, |x, _, px| px[0] = if x < 8 { 0 } else { 255 });
    let output = PixelMap::from_fn(8, 8, 1, |_, _, px| px[0] = 255);

    let out = Session::builder()
        .target(&PixelMap::new(8, 8, 1))
        .corpus(&corpus)
        .guidance(GuidanceMaps::new(&input, &output))
        .parameters(Parameters {
            map_weight: 1.0,
            trials: 50,
            ..base_params()
        })
        .build()
        .unwrap()
        .run(None)
        .unwrap();

    let right = out
        .sources()
        .iter()
        .filter(|s| matches!(s, Some((x, _)) if *x >= 8))
        .count();
    assert!(right > 40, "only {} of 64 sources follow the guidance", right);
}

#[test]
fn cancelled_before_seeding() {
    let token = CancelToken::new();
    token.cancel();

    let result = Session::builder()
        .target(&PixelMap::new(8, 8, 3))
        .corpus(&bands(8, 8))
        .cancel_token(token)
        .build()
        .unwrap()
        .run(None);

    assert!(matches!(result, Err(Error::Cancelled)));
}

#[test]
fn cancelled_after_seeding() {
    let token = CancelToken::new();
    let in_progress = token.clone();

    let progress = move |p: ProgressUpdate<'_>| {
        if p.stage.current == p.stage.total {
            in_progress.cancel();
        }
    };

    let out = Session::builder()
        .target(&PixelMap::new(8, 8, 3))
        .corpus(&bands(8, 8))
        .parameters(base_params())
        .cancel_token(token)
        .build()
        .unwrap()
        .run(Some(Box::new(progress)))
        .unwrap();

    assert!(out.was_cancelled());
    assert_eq!(out.passes(), 1);
    assert!(out.sources().iter().all(Option::is_some));
}

#[test]
fn transfers_sources() {
    let corpus = bands(12, 12);
    let normals = PixelMap::from_fn(12, 12, 2, |x, y, px| px.copy_from_slice(&[x as u8, y as u8]));
    let target = PixelMap::new(6, 6, 3);
    let mask = Mask::from_fn(6, 6, |x, _| if x > 2 { 255 } else { 0 });

    let out = run(&target, &mask, &corpus, base_params());
    let fallback = PixelMap::from_fn(6, 6, 2, |_, _, px| px.copy_from_slice(&[200, 200]));
    let moved = out.transfer(&normals, &fallback).unwrap();

    for (i, source) in out.sources().iter().enumerate() {
        let (x, y) = ((i % 6) as u32, (i / 6) as u32);
        match source {
            Some((sx, sy)) => assert_eq!(moved.get(x, y), &[*sx as u8, *sy as u8]),
            None => assert_eq!(moved.get(x, y), &[200, 200]),
        }
    }

    let uncertainty = out.uncertainty_map();
    assert_eq!(uncertainty.channels(), 1);
    assert_eq!(uncertainty.get(0, 0), &[0]);
}

#[test]
fn stops_when_improvement_stalls() {
    let target = PixelMap::new(24, 24, 3);
    let mask = Mask::all(24, 24);
    let corpus = noise(20, 20);

    let passes = |min_improvement| {
        run(
            &target,
            &mask,
            &corpus,
            Parameters {
                max_passes: 8,
                min_improvement,
                ..base_params()
            },
        )
        .passes()
    };

    // The seeding pass always runs, and no improvement pass touches every pixel
    assert_eq!(passes(1.0), 2);
    assert_eq!(passes(0.0), 8);
}

#[test]
fn uncertainty_follows_scores() {
    // A single hole in an image the corpus is a copy of, so the hole's own
    // position is a perfect fit
    let img = bands(8, 8);
    let hole = Mask::from_fn(8, 8, |x, y| if (x, y) == (4, 4) { 255 } else { 0 });

    let healed = run(
        &img,
        &hole,
        &img,
        Parameters {
            trials: 500,
            max_passes: 1,
            ..base_params()
        },
    );
    assert_eq!(healed.scores()[4 * 8 + 4], Some(0.0));
    assert_eq!(healed.uncertainty_map().get(4, 4), &[0]);

    // Without a border the first pixel visited has nothing to be compared
    // with, so it is picked at random with an unknown score
    let seeded = Session::builder()
        .target(&PixelMap::new(6, 6, 3))
        .corpus(&noise(8, 8))
        .parameters(Parameters {
            max_passes: 1,
            ..base_params()
        })
        .use_border(false)
        .build()
        .unwrap()
        .run(None)
        .unwrap();

    let unknown: Vec<_> = seeded
        .scores()
        .iter()
        .enumerate()
        .filter(|(_, s)| **s == Some(f32::INFINITY))
        .map(|(i, _)| ((i % 6) as u32, (i / 6) as u32))
        .collect();
    assert_eq!(unknown.len(), 1);

    let map = seeded.uncertainty_map();
    let (x, y) = unknown[0];
    assert_eq!(map.get(x, y), &[255]);

    for (i, score) in seeded.scores().iter().enumerate() {
        let expected = (score.unwrap().min(1.0) * 255.0) as u8;
        assert_eq!(map.get((i % 6) as u32, (i / 6) as u32), &[expected]);
    }
}

#[test]
fn image_round_trip_keeps_alpha() {
    use rs::image::{Rgba, RgbaImage};

    let mut img = RgbaImage::from_fn(10, 10, |x, y| {
        let a = if x < 5 { 255 } else { 0 };
        Rgba([(x * 20) as u8, (y * 20) as u8, 50, a])
    });

    let colors = rs::utils::color_map(&img);
    let corpus_mask = rs::utils::corpus_mask(&img, None).unwrap();
    let target_mask = rs::utils::target_mask(
        &img,
        Some(&Mask::from_fn(10, 10, |x, _| if x >= 5 { 255 } else { 0 })),
    )
    .unwrap();

    let params = base_params();
    let out = rs::synthesize(&colors, &target_mask, &colors, &corpus_mask, None, &params).unwrap();
    rs::utils::write_colors(&mut img, &out).unwrap();

    for (x, _, px) in img.enumerate_pixels() {
        assert_eq!(px[3], if x < 5 { 255 } else { 0 });
        if x >= 5 {
            // Only opaque pixels were ever copied
            assert!(px[0] < 100);
        }
    }
}
