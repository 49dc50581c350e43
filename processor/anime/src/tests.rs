#[cfg(test)]
mod anime_tests {
    use std::sync::{Arc, Mutex};

    use common::testing::{StaticFetcher, html, json, status};
    use common::{
        AbortController, AbortSignal, ContentHints, ContentSource, DetailRecord, ErrorKind,
        Method, ProviderKind, ResolveError, ResolveResult, SourceCandidate, SourceConfig,
        StreamSource, UNAVAILABLE, UrlNormalizer,
    };
    use url::Url;

    use crate::*;

    const BASE: &str = "https://anime.example/";

    const EPISODE_PAGE: &str = r#"
        <html><head><title>One Piece Episode 1100 | Anime</title></head><body>
        <div class="venutama">
          <h1 class="posttl">One Piece Episode 1100 Subtitle Indonesia</h1>
          <div class="mirrorstream">
            <select id="change-server">
              <option value="">Pilih Server</option>
              <option value="https://example.org/embed/720">Mirror 720p</option>
              <option data-content="https://www.mp4upload.com/embed-ep1100.html">480p - Mp4upload</option>
              <option value="//desustream.info/dstream/ondesu/hd/v5/index.php?id=abc">360p Desustream</option>
            </select>
          </div>
          <div id="pembed"><iframe src="https://desustream.info/default"></iframe></div>
          <div class="infozingle">
            <p><span><b>Skor</b>: 8.72</span></p>
            <p><span><b>Status</b>: Ongoing</span></p>
            <p><span><b>Genre</b>: <a>Action</a>, <a>Adventure</a></span></p>
            <p><span><b>Tanggal Rilis</b>: Oct 20, 1999</span></p>
          </div>
        </div>
        </body></html>
    "#;

    const EMBED_ONLY_PAGE: &str = r#"
        <html><body>
          <h1 class="posttl">Movie</h1>
          <div id="change-server"></div>
          <div id="pembed"><iframe src="//desustream.info/dstream/movie"></iframe></div>
        </body></html>
    "#;

    const SERIES_PAGE: &str = r#"
        <html><head><title>One Piece | Anime</title></head><body>
        <div class="jdlrx"><h1>One Piece Sub Indo</h1></div>
        <div class="infozingle">
          <p><span><b>Status</b>: Ongoing</span></p>
          <p><span><b>Genre</b>: Action, Fantasy</span></p>
        </div>
        <div class="episodelist"><ul>
          <li><span><a href="/episode/wpce-episode-1100-sub-indo/">One Piece Episode 1100</a></span>
              <span class="zeebr">20 Okt,24</span></li>
          <li><span><a href="https://anime.example/episode/wpce-episode-1099-sub-indo/">One Piece Episode 1099</a></span></li>
        </ul></div>
        </body></html>
    "#;

    const SEARCH_PAGE: &str = r#"
        <html><body>
        <ul class="chivsrc">
          <li><img src="https://cdn.example/op.jpg">
              <h2><a href="/anime/1piece-sub-indo/">One Piece Subtitle Indonesia</a></h2>
              <div class="set"><b>Genres</b> : Action</div></li>
          <li><img data-src="/wp-content/uploads/op-film.jpg" src="data:image/gif;base64,R0l">
              <h2><a href="/anime/op-film-red/">One Piece Film Red</a></h2></li>
        </ul>
        <div class="hpage"><a class="r" href="/page/2/?s=one+piece&post_type=anime">Next</a></div>
        </body></html>
    "#;

    const CATALOGUE_PAGE: &str = r#"
        <html><body>
        <div class="venz"><ul>
          <li><div class="detpost">
            <div class="epz"> Episode 12</div>
            <div class="thumb"><a href="https://anime.example/anime/kny-s4-sub-indo/">
              <div class="thumbz"><img src="https://cdn.example/kny.jpg">
              <h2 class="jdlflm">Kimetsu no Yaiba S4</h2></div></a></div>
          </div></li>
        </ul></div>
        </body></html>
    "#;

    fn normalizer() -> UrlNormalizer {
        UrlNormalizer::parse(BASE).unwrap()
    }

    fn source(fetcher: Arc<StaticFetcher>) -> AnimeSource {
        let config = SourceConfig::new(Url::parse(BASE).unwrap());
        AnimeSource::new(&config, fetcher)
    }

    fn parse(body: &str, page: u32) -> ResolveResult<DetailRecord> {
        let normalizer = normalizer();
        let hints = ContentHints::new(&normalizer)
            .content_type("text/html")
            .page(page);
        classify_and_parse(body, &hints)
    }

    // ========== 页面解析 ==========

    #[test]
    fn test_parse_streaming_page() {
        let DetailRecord::Streaming(page) = parse(EPISODE_PAGE, 1).unwrap() else {
            panic!("expected streaming page");
        };

        assert_eq!(page.title, "One Piece Episode 1100 Subtitle Indonesia");

        // 按站点偏好排序，而不是页面顺序
        let ranked: Vec<(&str, &str, ProviderKind)> = page
            .candidates
            .iter()
            .map(|c| (c.label.as_str(), c.raw_link.as_str(), c.provider_kind))
            .collect();
        assert_eq!(
            ranked,
            vec![
                (
                    "360p",
                    "https://desustream.info/dstream/ondesu/hd/v5/index.php?id=abc",
                    ProviderKind::Desustream
                ),
                ("480p", "https://www.mp4upload.com/embed-ep1100.html", ProviderKind::Mp4upload),
                ("720p", "https://example.org/embed/720", ProviderKind::Generic),
            ]
        );

        assert_eq!(page.metadata.rating, "8.72");
        assert_eq!(page.metadata.status, "Ongoing");
        assert_eq!(page.metadata.genres, vec!["Action", "Adventure"]);
        assert_eq!(page.metadata.release_year, "1999");
    }

    #[test]
    fn test_streaming_page_falls_back_to_embed() {
        let DetailRecord::Streaming(page) = parse(EMBED_ONLY_PAGE, 1).unwrap() else {
            panic!("expected streaming page");
        };
        assert_eq!(page.candidates.len(), 1);
        assert_eq!(page.candidates[0].label, "unknown");
        assert_eq!(page.candidates[0].raw_link, "https://desustream.info/dstream/movie");
        assert_eq!(page.candidates[0].provider_kind, ProviderKind::Desustream);
        assert_eq!(page.metadata.status, UNAVAILABLE);
    }

    #[test]
    fn test_parse_listing_page() {
        let DetailRecord::Listing(page) = parse(SERIES_PAGE, 1).unwrap() else {
            panic!("expected listing page");
        };

        assert_eq!(page.title, "One Piece Sub Indo");
        assert_eq!(page.metadata.status, "Ongoing");
        assert_eq!(page.metadata.rating, UNAVAILABLE);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].title, "One Piece Episode 1100");
        assert_eq!(
            page.items[0].url,
            "https://anime.example/episode/wpce-episode-1100-sub-indo/"
        );
        assert_eq!(page.items[0].subtitle, "20 Okt,24");
        assert_eq!(page.items[1].subtitle, UNAVAILABLE);
        assert!(page.items.iter().all(|item| item.thumbnail.is_empty()));
    }

    #[test]
    fn test_parse_search_page() {
        let DetailRecord::Search(page) = parse(SEARCH_PAGE, 3).unwrap() else {
            panic!("expected search page");
        };

        assert!(page.has_next);
        assert_eq!(page.page, 3);
        assert_eq!(page.next_page(), Some(4));
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].url, "https://anime.example/anime/1piece-sub-indo/");
        assert_eq!(page.items[0].thumbnail, "https://cdn.example/op.jpg");
        assert_eq!(page.items[0].subtitle, "Genres : Action");
        assert_eq!(
            page.items[1].thumbnail,
            "https://anime.example/wp-content/uploads/op-film.jpg"
        );
        assert_eq!(page.items[1].subtitle, UNAVAILABLE);
    }

    #[test]
    fn test_parse_catalogue_page() {
        let DetailRecord::Search(page) = parse(CATALOGUE_PAGE, 1).unwrap() else {
            panic!("expected search page");
        };

        assert!(!page.has_next);
        assert_eq!(page.next_page(), None);
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].title, "Kimetsu no Yaiba S4");
        assert_eq!(page.items[0].url, "https://anime.example/anime/kny-s4-sub-indo/");
        assert_eq!(page.items[0].subtitle, "Episode 12");
    }

    #[test]
    fn test_unknown_document_is_parse_error() {
        let err = parse("<html><body><p>Maintenance</p></body></html>", 1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);

        let err = parse(r#"{"status": "ok"}"#, 1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);
    }

    #[test]
    fn test_fingerprint_priority() {
        // 播放页上附带的剧集列表和推荐网格不改变分类
        let body = EPISODE_PAGE.replace(
            "</body>",
            r#"<div class="episodelist"><ul><li><a href="/episode/x/">X</a></li></ul></div>
               <div class="venz"><ul><li><h2>Y</h2></li></ul></div></body>"#,
        );
        let record = parse(&body, 1).unwrap();
        assert_eq!(record.variant_name(), "streaming");

        // 剧集列表优先于结果网格
        let body = SERIES_PAGE.replace(
            "</body>",
            r#"<ul class="chivsrc"><li><h2><a href="/anime/z/">Z</a></h2></li></ul></body>"#,
        );
        let DetailRecord::Listing(page) = parse(&body, 1).unwrap() else {
            panic!("expected listing page");
        };
        assert_eq!(page.items.len(), 2);
    }

    #[test]
    fn test_parse_resolution_label() {
        let cases = vec![
            ("480p", "480p"),
            ("Mirror 720P", "720p"),
            ("1080p HD", "1080p"),
            ("Server 2 360p", "360p"),
            ("4K 2160", "2160p"),
            ("99p", "unknown"),
            ("8640p", "unknown"),
            ("HD", "unknown"),
            ("", "unknown"),
        ];

        for (input, expected) in cases {
            assert_eq!(parse_resolution_label(input), expected, "input: {:?}", input);
        }
    }

    // ========== 候选源回退 ==========

    /// 记录调用顺序的提取器
    #[derive(Default)]
    struct FakeExtractor {
        failing: Vec<&'static str>,
        empty: Vec<&'static str>,
        abort_on_call: Option<Arc<AbortController>>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeExtractor {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl StreamExtractor for FakeExtractor {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn extract(
            &self,
            candidate: &SourceCandidate,
            _signal: &AbortSignal,
        ) -> ResolveResult<Vec<StreamSource>> {
            self.calls.lock().unwrap().push(candidate.raw_link.clone());
            if let Some(controller) = &self.abort_on_call {
                controller.abort();
            }

            let link = candidate.raw_link.as_str();
            if self.failing.contains(&link) {
                return Err(ResolveError::Network("connection reset".to_string()));
            }
            if self.empty.contains(&link) {
                return Ok(Vec::new());
            }
            Ok(vec![StreamSource {
                url: format!("{}/stream.mp4", link),
            }])
        }
    }

    const A_480: &str = "https://desustream.info/a";
    const B_480: &str = "https://www.mp4upload.com/b";
    const C_360: &str = "https://kuramadrive.com/c";

    fn three_candidates() -> Vec<SourceCandidate> {
        // 故意打乱页面顺序
        vec![
            SourceCandidate::new("360p", C_360),
            SourceCandidate::new("480p", B_480),
            SourceCandidate::new("480p", A_480),
        ]
    }

    fn resolver(fake: &Arc<FakeExtractor>) -> Resolver {
        Resolver::new(ProviderRegistry::new(fake.clone()))
    }

    #[tokio::test]
    async fn test_quality_first_then_degrade() {
        let fake = Arc::new(FakeExtractor {
            failing: vec![A_480],
            ..Default::default()
        });

        let stream = resolver(&fake)
            .resolve(&three_candidates(), Some("480p"), &AbortSignal::never())
            .await
            .unwrap();

        // 480p 只尝试一次，然后降级到 360p
        assert_eq!(fake.calls(), vec![A_480, C_360]);
        assert_eq!(stream.resolution_used, "360p");
        assert_eq!(stream.sources[0].url, format!("{}/stream.mp4", C_360));
        assert_eq!(stream.valid_resolutions, vec!["480p", "360p"]);
    }

    #[tokio::test]
    async fn test_fallback_order_is_deterministic() {
        let fake = Arc::new(FakeExtractor {
            failing: vec![A_480],
            ..Default::default()
        });
        let resolver = resolver(&fake);
        let signal = AbortSignal::never();

        let first = resolver.resolve(&three_candidates(), Some("480p"), &signal).await.unwrap();
        let second = resolver.resolve(&three_candidates(), Some("480p"), &signal).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(fake.calls(), vec![A_480, C_360, A_480, C_360]);
    }

    #[tokio::test]
    async fn test_without_match_uses_preference_order() {
        let fake = Arc::new(FakeExtractor::default());

        let stream = resolver(&fake)
            .resolve(&three_candidates(), Some("1080p"), &AbortSignal::never())
            .await
            .unwrap();
        assert_eq!(stream.resolution_used, "480p");
        assert_eq!(fake.calls(), vec![A_480]);

        let stream = resolver(&fake)
            .resolve(&three_candidates(), None, &AbortSignal::never())
            .await
            .unwrap();
        assert_eq!(stream.resolution_used, "480p");
    }

    #[tokio::test]
    async fn test_preferred_regex_pattern() {
        let fake = Arc::new(FakeExtractor::default());

        let stream = resolver(&fake)
            .resolve(&three_candidates(), Some(r"3\d0P"), &AbortSignal::never())
            .await
            .unwrap();
        assert_eq!(stream.resolution_used, "360p");
        assert_eq!(fake.calls(), vec![C_360]);
    }

    #[tokio::test]
    async fn test_empty_result_counts_as_failure() {
        let fake = Arc::new(FakeExtractor {
            empty: vec![A_480],
            ..Default::default()
        });

        let stream = resolver(&fake)
            .resolve(&three_candidates(), None, &AbortSignal::never())
            .await
            .unwrap();
        assert_eq!(stream.resolution_used, "360p");
        assert_eq!(fake.calls(), vec![A_480, C_360]);
    }

    #[tokio::test]
    async fn test_next_label_follows_preference_order() {
        const A_720: &str = "https://desustream.info/720";
        const B_1080: &str = "https://www.mp4upload.com/1080";
        const C_480: &str = "https://kuramadrive.com/480";
        let candidates = vec![
            SourceCandidate::new("480p", C_480),
            SourceCandidate::new("1080p", B_1080),
            SourceCandidate::new("720p", A_720),
        ];
        let fake = Arc::new(FakeExtractor {
            failing: vec![A_720],
            ..Default::default()
        });

        let stream = resolver(&fake)
            .resolve(&candidates, Some("720p"), &AbortSignal::never())
            .await
            .unwrap();

        // 下一个标签取站点偏好顺序中的第一个，可能比原标签更高
        assert_eq!(fake.calls(), vec![A_720, B_1080]);
        assert_eq!(stream.resolution_used, "1080p");
        assert_eq!(stream.valid_resolutions, vec!["720p", "1080p", "480p"]);
    }

    #[tokio::test]
    async fn test_exhaustion_is_unsupported() {
        let fake = Arc::new(FakeExtractor {
            failing: vec![A_480, B_480, C_360],
            ..Default::default()
        });

        let err = resolver(&fake)
            .resolve(&three_candidates(), Some("480p"), &AbortSignal::never())
            .await
            .unwrap_err();

        assert!(matches!(err, ResolveError::UnsupportedSource));
        assert_eq!(err.user_message(), common::UNSUPPORTED_MESSAGE);
        // 每个标签只尝试一次
        assert_eq!(fake.calls(), vec![A_480, C_360]);

        let err = resolver(&fake)
            .resolve(&[], None, &AbortSignal::never())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedSource);
    }

    #[tokio::test]
    async fn test_abort_between_attempts() {
        let controller = Arc::new(AbortController::new());
        let fake = Arc::new(FakeExtractor {
            failing: vec![A_480],
            abort_on_call: Some(Arc::clone(&controller)),
            ..Default::default()
        });

        let err = resolver(&fake)
            .resolve(&three_candidates(), Some("480p"), &controller.signal())
            .await
            .unwrap_err();

        assert!(matches!(err, ResolveError::Canceled));
        assert!(err.is_silent());
        assert_eq!(fake.calls(), vec![A_480]);
    }

    #[tokio::test]
    async fn test_already_aborted_makes_no_attempt() {
        let controller = AbortController::new();
        controller.abort();
        let fake = Arc::new(FakeExtractor::default());

        let err = resolver(&fake)
            .resolve(&three_candidates(), None, &controller.signal())
            .await
            .unwrap_err();

        assert!(matches!(err, ResolveError::Canceled));
        assert!(fake.calls().is_empty());
    }

    // ========== 内容源 ==========

    #[tokio::test]
    async fn test_example_scenario_degrades_to_360p() {
        const EPISODE: &str = "https://anime.example/episode/op-1100/";
        const PROVIDER_A: &str = "https://desustream.info/embed/360";
        const PROVIDER_B: &str = "https://www.mp4upload.com/embed-480.html";

        let fetcher = Arc::new(StaticFetcher::new());
        fetcher.route(
            Method::Get,
            EPISODE,
            html(&format!(
                r#"<select id="change-server">
                     <option value="{}">360p - Provider A</option>
                     <option value="{}">480p - Provider B</option>
                   </select>"#,
                PROVIDER_A, PROVIDER_B
            )),
        );
        fetcher.route(Method::Get, PROVIDER_B, status(500));
        fetcher.route(
            Method::Get,
            PROVIDER_A,
            html(r#"<video controls><source src="/media/ep-360.mp4" type="video/mp4"></video>"#),
        );

        let source = source(fetcher.clone());
        let signal = AbortSignal::never();
        let DetailRecord::Streaming(page) = source.resolve_detail(EPISODE, &signal).await.unwrap()
        else {
            panic!("expected streaming page");
        };

        let stream = source
            .resolve_source(&page.candidates, Some("480p"), &signal)
            .await
            .unwrap();

        assert_eq!(stream.resolution_used, "360p");
        assert_eq!(stream.sources.len(), 1);
        assert_eq!(stream.sources[0].url, "https://desustream.info/media/ep-360.mp4");
        assert_eq!(stream.valid_resolutions, vec!["360p", "480p"]);
        assert_eq!(fetcher.calls(Method::Get, PROVIDER_B), 1);
    }

    #[tokio::test]
    async fn test_authenticated_embed_chain() {
        const EMBED: &str = "https://v2.kuramadrive.com/embed/7";
        const PLAYER: &str = "https://v2.kuramadrive.com/player/7";

        let fetcher = Arc::new(StaticFetcher::new());
        fetcher.route(
            Method::Head,
            BASE,
            html("").with_header("set-cookie", "XSRF-TOKEN=abc; Path=/"),
        );
        fetcher.route(
            Method::Get,
            "https://anime.example/api/v1/token",
            json(r#"{"token": "tok", "sign": "sig"}"#),
        );
        fetcher.route(Method::Get, EMBED, html(r#"<iframe src="/player/7"></iframe>"#));
        fetcher.route(
            Method::Get,
            PLAYER,
            html(r#"<script>var sources = [{file: "https://cdn.kuramadrive.com/7.mp4"}];</script>"#),
        );

        let source = source(fetcher.clone());
        let stream = source
            .resolve_source(
                &[SourceCandidate::new("720p", EMBED)],
                None,
                &AbortSignal::never(),
            )
            .await
            .unwrap();

        assert_eq!(stream.sources[0].url, "https://cdn.kuramadrive.com/7.mp4");
        assert_eq!(fetcher.calls(Method::Head, BASE), 1);

        let sent = fetcher.requests_to(EMBED).pop().unwrap();
        assert!(sent.url.contains("token=tok"));
        assert!(sent.url.contains("sign=sig"));
        assert_eq!(fetcher.requests_to(PLAYER).len(), 1);
    }

    #[tokio::test]
    async fn test_search() {
        let fetcher = Arc::new(StaticFetcher::new());
        fetcher.route(
            Method::Get,
            "https://anime.example/?s=one+piece&post_type=anime",
            html(SEARCH_PAGE),
        );
        fetcher.route(
            Method::Get,
            "https://anime.example/page/2/?s=one+piece&post_type=anime",
            html(CATALOGUE_PAGE),
        );
        let source = source(fetcher.clone());
        let signal = AbortSignal::never();

        let first = source.search(" one piece ", None, &signal).await.unwrap();
        assert_eq!(first.page, 1);
        assert_eq!(first.items.len(), 2);
        assert_eq!(first.next_page(), Some(2));

        let second = source.search("one piece", first.next_page(), &signal).await.unwrap();
        assert_eq!(second.page, 2);
        assert!(!second.has_next);

        // 空关键字不发请求
        let empty = source.search("  ", None, &signal).await.unwrap();
        assert!(empty.items.is_empty());
        assert_eq!(fetcher.total_calls(), 2);
    }

    #[tokio::test]
    async fn test_resolve_listing_with_page() {
        let fetcher = Arc::new(StaticFetcher::new());
        fetcher.route(
            Method::Get,
            "https://anime.example/ongoing-anime/page/2/",
            html(CATALOGUE_PAGE),
        );
        let source = source(fetcher);

        let record = source
            .resolve_listing("https://anime.example/ongoing-anime/", Some(2), &AbortSignal::never())
            .await
            .unwrap();
        assert!(matches!(record, DetailRecord::Search(ref page) if page.page == 2));
    }

    #[tokio::test]
    async fn test_record_kind_mismatch() {
        const SERIES: &str = "https://anime.example/anime/1piece-sub-indo/";
        let fetcher = Arc::new(StaticFetcher::new());
        fetcher.route(Method::Get, SERIES, html(SERIES_PAGE));
        let source = source(fetcher);
        let signal = AbortSignal::never();

        let err = source.resolve_detail(SERIES, &signal).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);

        let record = source.resolve_listing(SERIES, None, &signal).await.unwrap();
        assert_eq!(record.variant_name(), "listing");

        let err = source
            .resolve_listing("https://anime.example/anime/missing/", None, &signal)
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::Http { status: 404, .. }));
    }

    #[test]
    fn test_pattern_and_assets() {
        let source = source(Arc::new(StaticFetcher::new()));
        assert!(source.regex().is_match("https://otakudesu.cloud/anime/1piece-sub-indo/"));
        assert!(source.regex().is_match("https://otakudesu.cloud/episode/wpce-episode-1100/"));
        assert!(!source.regex().is_match("https://komikcast.li/komik/one-piece/"));

        assert_eq!(
            source.build_asset_url("/cover.jpg", 100, 75),
            "https://anime.example/_next/image?url=%2Fcover.jpg&w=128&q=75"
        );
        assert_eq!(source.build_asset_url("", 100, 75), "");
    }

    #[tokio::test]
    #[ignore = "需要网络，仅手动测试"]
    async fn test_live_search() {
        dotenv::dotenv().ok();
        let source = AnimeSource::from_env().unwrap();
        let page = source
            .search("one piece", None, &AbortSignal::never())
            .await
            .unwrap();
        println!("结果: {:#?}", page);
    }
}
