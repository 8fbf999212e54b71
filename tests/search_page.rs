use chrono::{TimeZone, Utc};
use serde_json::Value;

use schleppnetz::{
    Category, FieldSpec, FilterStep, ListSchema, Page, SiteSchema, Tag, TagRule, TorrentField,
    Tracker,
};

/// AvistaZ-style listing: sortable headers, an icon category column, the
/// uploader in the last column unless a hint claims it.
const SEARCH_PAGE: &str = r#"<html><body>
<table class="torrents">
  <thead>
    <tr>
      <th class="torrents-icon">Cat</th>
      <th>Name</th>
      <th><a href="/movies?sort=comment_count">C</a></th>
      <th><a href="/movies?sort=age">Added</a></th>
      <th><a href="/movies?sort=size">Size</a></th>
      <th><a href="/movies?sort=seed">S</a></th>
      <th><a href="/movies?sort=leech">L</a></th>
      <th><a href="/movies?sort=complete">Done</a></th>
    </tr>
  </thead>
  <tbody>
    <tr>
      <td class="cat"><i class="torrents-icon" title="Movies Torrent"></i></td>
      <td>
        <a class="torrent-title" href="torrent/4711-ubuntu-2404">Ubuntu 24.04</a>
        <span class="sub">LTS release</span>
        <a class="download" href="/download/4711.torrent">DL</a>
        <span class="pro_free">FREE</span>
      </td>
      <td>12</td>
      <td><span title="2021-05-06 13:52:01">3 days ago</span></td>
      <td>1.5 GiB</td>
      <td>25</td>
      <td>3</td>
      <td>1,234</td>
    </tr>
    <tr>
      <td class="cat"><i class="torrents-icon" title="Linux Torrent"></i></td>
      <td>
        <a class="torrent-title" href="torrent/813-debian-12">Debian 12</a>
        <a class="download" href="https://mirror.example.org/813.torrent">DL</a>
        <span class="pro_50">50%</span>
      </td>
      <td>0</td>
      <td><span title="2020-01-02 00:00:00">last year</span></td>
      <td>700 MiB</td>
      <td>8</td>
      <td>0</td>
      <td>99</td>
    </tr>
  </tbody>
</table>
</body></html>"#;

fn search_schema() -> SiteSchema {
    SiteSchema::new(
        ListSchema::new("table.torrents > tbody > tr")
            .header("table.torrents > thead > tr")
            .field(TorrentField::Title, FieldSpec::selector("a.torrent-title"))
            .field(
                TorrentField::Url,
                FieldSpec::selector("a.torrent-title").attr("href"),
            )
            .field(
                TorrentField::Link,
                FieldSpec::selector("a.download").attr("href"),
            )
            .field(TorrentField::SubTitle, FieldSpec::selector("span.sub"))
            .field(
                TorrentField::Id,
                FieldSpec::selector("a.torrent-title")
                    .attr("href")
                    .filter(FilterStep::call(
                        "extract",
                        vec![Value::from(r"torrent/(\d+)")],
                    )),
            )
            .tag(TagRule::new("span.pro_free", "Free"))
            .tag(TagRule::new("span.pro_50", "50%")),
    )
}

fn tracker() -> Tracker {
    Tracker::builder("demo", "https://demo.example")
        .unwrap()
        .schema(search_schema())
        .build()
        .unwrap()
}

#[test]
fn tabular_listing_extracts_declared_and_inferred_fields() {
    let out = tracker().search_results(&Page::html(SEARCH_PAGE));
    assert_eq!(out.diagnostic, None);
    assert_eq!(out.len(), 2);

    let first = &out.records[0];
    assert_eq!(first.id, "4711");
    assert_eq!(first.title, "Ubuntu 24.04");
    assert_eq!(first.sub_title.as_deref(), Some("LTS release"));
    assert_eq!(first.url, "https://demo.example/torrent/4711-ubuntu-2404");
    assert_eq!(first.link, "https://demo.example/download/4711.torrent");
    assert_eq!(first.comments, 12);
    assert_eq!(
        first.time,
        Utc.with_ymd_and_hms(2021, 5, 6, 13, 52, 1)
            .unwrap()
            .timestamp_millis()
    );
    assert_eq!(first.size, (1.5 * 1024f64.powi(3)) as u64);
    assert_eq!(first.seeders, 25);
    assert_eq!(first.leechers, 3);
    assert_eq!(first.completed, 1234);
    // the completed hint claimed the last column, so no author
    assert_eq!(first.author, "");
    assert_eq!(first.category, Some(Category::new("Movies")));
    assert_eq!(
        first.tags,
        vec![Tag {
            name: "Free".to_string(),
            color: "blue".to_string(),
        }]
    );
}

#[test]
fn absolute_links_pass_through_unchanged() {
    let out = tracker().search_results(&Page::html(SEARCH_PAGE));
    let second = &out.records[1];
    assert_eq!(second.link, "https://mirror.example.org/813.torrent");
    assert_eq!(second.url, "https://demo.example/torrent/813-debian-12");
    assert_eq!(second.category, Some(Category::new("Linux")));
    assert_eq!(second.sub_title, None);
    assert_eq!(
        second.tags,
        vec![Tag {
            name: "50%".to_string(),
            color: "orange".to_string(),
        }]
    );
}

#[test]
fn headerless_table_consumes_the_first_row() {
    let page = Page::html(
        r#"<table class="plain">
          <tr>
            <th class="torrents-icon">C</th>
            <th>Name</th>
            <th><a href="?sort=size">Size</a></th>
            <th><a href="?sort=seed">S</a></th>
          </tr>
          <tr>
            <td><i class="torrents-icon" title="Music Torrent"></i></td>
            <td><a class="t" href="/t/1">One</a></td>
            <td>10 MiB</td>
            <td>5</td>
          </tr>
        </table>"#,
    );
    let schema = SiteSchema::new(
        ListSchema::new("table.plain tr")
            .field(TorrentField::Title, FieldSpec::selector("a.t"))
            .field(TorrentField::Url, FieldSpec::selector("a.t").attr("href")),
    );
    let tracker = Tracker::builder("demo", "https://demo.example")
        .unwrap()
        .schema(schema)
        .build()
        .unwrap();

    let out = tracker.search_results(&page);
    assert_eq!(out.diagnostic, None);
    assert_eq!(out.len(), 1);
    let entry = &out.records[0];
    assert_eq!(entry.title, "One");
    assert_eq!(entry.size, 10 * 1024 * 1024);
    assert_eq!(entry.seeders, 5);
    assert_eq!(entry.author, "");
    assert_eq!(entry.category, Some(Category::new("Music")));
}

#[test]
fn malformed_rows_are_dropped_not_fatal() {
    let page = Page::html(
        r#"<table class="torrents"><thead><tr><th>Name</th></tr></thead><tbody>
          <tr><td><a class="torrent-title" href="torrent/1-a">A</a>
              <a class="download" href="/d/1">DL</a></td></tr>
          <tr><td><a class="torrent-title" href="torrent/broken">B</a>
              <a class="download" href="/d/2">DL</a></td></tr>
          <tr><td><a class="torrent-title" href="torrent/3-c">C</a>
              <a class="download" href="/d/3">DL</a></td></tr>
        </tbody></table>"#,
    );
    let out = tracker().search_results(&page);
    assert_eq!(out.len(), 2);
    assert_eq!(out.records[0].id, "1");
    assert_eq!(out.records[1].id, "3");
    let diagnostic = out.diagnostic.expect("dropped row leaves a diagnostic");
    assert!(diagnostic.contains("[demo] failed to read torrent fields"));
    assert!(diagnostic.contains("id"));
}

#[test]
fn zero_rows_yield_empty_with_diagnostic() {
    let out = tracker().search_results(&Page::html("<html><body><p>nothing</p></body></html>"));
    assert!(out.is_empty());
    let diagnostic = out.diagnostic.expect("missing rows leave a diagnostic");
    assert!(diagnostic.starts_with("[demo] no rows matched"));
    assert!(diagnostic.contains("table.torrents > tbody > tr"));
}

const PAIRED_ROWS: &str = r#"<table class="list"><tbody>
  <tr class="main" data-size="1 GiB"><td><a class="t" href="/t/1">One</a><b class="se">3</b></td></tr>
  <tr class="desc"><td><span class="s">remux one</span></td></tr>
  <tr class="main" data-size="2 GiB"><td><a class="t" href="/t/2">Two</a><b class="se">5</b></td></tr>
  <tr class="desc"><td><span class="s">remux two</span></td></tr>
  <tr class="main" data-size="3 GiB"><td><a class="t" href="/t/3">Three</a><b class="se">7</b></td></tr>
  <tr class="desc"><td><span class="s">remux three</span></td></tr>
  <tr class="main" data-size="4 GiB"><td><a class="t" href="/t/4">Four</a><b class="se">9</b></td></tr>
  <tr class="desc"><td><span class="s">remux four</span></td></tr>
  <tr class="main" data-size="5 GiB"><td><a class="t" href="/t/5">Five</a><b class="se">11</b></td></tr>
  <tr class="desc"><td><span class="s">remux five</span></td></tr>
</tbody></table>"#;

fn paired_schema(merge: usize) -> SiteSchema {
    let mut list = ListSchema::new("table.list > tbody > tr")
        .merge(merge)
        .field(TorrentField::Title, FieldSpec::selector("a.t"))
        .field(TorrentField::SubTitle, FieldSpec::selector("tr.desc span.s"))
        .field(
            TorrentField::Size,
            FieldSpec::selector("tr.main")
                .data("size")
                .filter(FilterStep::name("parseSize")),
        )
        .field(
            TorrentField::Seeders,
            FieldSpec::selector("b.se").filter(FilterStep::name("parseNumber")),
        );
    // map the remaining tabular fields so no header row gets consumed
    for field in [
        TorrentField::Time,
        TorrentField::Leechers,
        TorrentField::Completed,
        TorrentField::Comments,
        TorrentField::Author,
        TorrentField::Category,
    ] {
        list = list.field(field, FieldSpec::not_applicable());
    }
    SiteSchema::new(list)
}

#[test]
fn merge_groups_row_pairs_into_records() {
    let tracker = Tracker::builder("demo", "https://demo.example")
        .unwrap()
        .schema(paired_schema(2))
        .build()
        .unwrap();
    let out = tracker.search_results(&Page::html(PAIRED_ROWS));
    assert_eq!(out.diagnostic, None);
    assert_eq!(out.len(), 5);

    let third = &out.records[2];
    assert_eq!(third.title, "Three");
    // the description row is part of the same scope
    assert_eq!(third.sub_title.as_deref(), Some("remux three"));
    assert_eq!(third.size, 3 * 1024u64.pow(3));
    assert_eq!(third.seeders, 7);
}

#[test]
fn merge_of_one_keeps_every_row() {
    let tracker = Tracker::builder("demo", "https://demo.example")
        .unwrap()
        .schema(paired_schema(1))
        .build()
        .unwrap();
    let out = tracker.search_results(&Page::html(PAIRED_ROWS));
    assert_eq!(out.len(), 10);
    // description rows resolve no title at all
    assert_eq!(out.records[1].title, "");
    assert_eq!(out.records[1].sub_title.as_deref(), Some("remux one"));
}

#[test]
fn detail_page_resolves_against_the_root() {
    let page = Page::html(
        r#"<html><body>
          <h1 id="name">Ubuntu 24.04</h1>
          <a id="dl" href="/download.php?id=4711">download</a>
        </body></html>"#,
    );
    let schema = SiteSchema::default()
        .detail_field(TorrentField::Title, FieldSpec::selector("h1#name"))
        .detail_field(TorrentField::Link, FieldSpec::selector("a#dl").attr("href"))
        .detail_field(
            TorrentField::Id,
            FieldSpec::selector("a#dl")
                .attr("href")
                .filter(FilterStep::call("querystring", vec![Value::from("id")])),
        );
    let tracker = Tracker::builder("demo", "https://demo.example")
        .unwrap()
        .schema(schema)
        .build()
        .unwrap();

    let out = tracker.detail(&page);
    assert_eq!(out.len(), 1);
    let torrent = &out.records[0];
    assert_eq!(torrent.title, "Ubuntu 24.04");
    assert_eq!(torrent.id, "4711");
    assert_eq!(torrent.link, "https://demo.example/download.php?id=4711");
}
