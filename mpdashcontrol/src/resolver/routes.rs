use crate::model::Tag;

use super::{Route, RouteTable, RouteTableError, Segment, Shape};

/// Tags browsable as `/{facet}/{value}/{album}/{title}`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Facet {
    Artists,
    AlbumArtists,
    Genres,
    Dates,
    Labels,
}

impl Facet {
    pub const ALL: [Facet; 5] = [
        Facet::Artists,
        Facet::AlbumArtists,
        Facet::Genres,
        Facet::Dates,
        Facet::Labels,
    ];

    /// Path segment, e.g. `albumartists`.
    pub fn segment(&self) -> &'static str {
        match self {
            Facet::Artists => "artists",
            Facet::AlbumArtists => "albumartists",
            Facet::Genres => "genres",
            Facet::Dates => "dates",
            Facet::Labels => "labels",
        }
    }

    pub fn tag(&self) -> Tag {
        match self {
            Facet::Artists => Tag::Artist,
            Facet::AlbumArtists => Tag::AlbumArtist,
            Facet::Genres => Tag::Genre,
            Facet::Dates => Tag::OriginalDate,
            Facet::Labels => Tag::Label,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Facet::Artists => "Artists",
            Facet::AlbumArtists => "AlbumArtists",
            Facet::Genres => "Genres",
            Facet::Dates => "Dates",
            Facet::Labels => "Labels",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum View {
    Status,
    Queue,
    Search,
    Playlists,
    Playlist,
    /// Values of a facet tag.
    FacetValues(Facet),
    /// Albums for one facet value.
    FacetValue(Facet),
    /// Tracks of one album under a facet value.
    FacetAlbum(Facet),
    FacetTrack(Facet),
    Albums,
    AlbumTracks,
    AlbumTrack,
    Titles,
    TracksByTag,
}

impl RouteTable {
    /// The dashboard's routes.
    pub fn standard() -> Result<Self, RouteTableError> {
        use Segment::{Literal, Param};
        use Shape::{Collection, Item};

        let mut routes = vec![
            Route::new(vec![Literal("status")], Item, View::Status),
            Route::new(vec![Literal("queue")], Collection, View::Queue),
            Route::new(vec![Literal("search")], Item, View::Search),
            Route::new(vec![Literal("playlists")], Collection, View::Playlists),
            Route::new(vec![Literal("playlists"), Param], Collection, View::Playlist),
        ];

        for facet in Facet::ALL {
            let root = Literal(facet.segment());
            routes.extend([
                Route::new(vec![root], Collection, View::FacetValues(facet)),
                Route::new(vec![root, Param], Collection, View::FacetValue(facet)),
                Route::new(vec![root, Param, Param], Collection, View::FacetAlbum(facet)),
                Route::new(vec![root, Param, Param, Param], Item, View::FacetTrack(facet)),
            ]);
        }

        routes.extend([
            Route::new(vec![Literal("albums")], Collection, View::Albums),
            Route::new(vec![Literal("albums"), Param], Collection, View::AlbumTracks),
            Route::new(vec![Literal("albums"), Param, Param], Item, View::AlbumTrack),
            Route::new(vec![Literal("tracks")], Collection, View::Titles),
            Route::new(vec![Literal("tracks"), Param, Param], Collection, View::TracksByTag),
        ]);

        RouteTable::new(routes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::{RouteOutcome, encode_path};

    #[test]
    fn test_standard_table_is_disjoint() {
        let table = RouteTable::standard().unwrap();
        assert_eq!(table.routes().len(), 5 + 4 * Facet::ALL.len() + 5);
    }

    #[test]
    fn test_every_facet_routed() {
        let table = RouteTable::standard().unwrap();
        for facet in Facet::ALL {
            let path = format!("/{}/", facet.segment());
            assert!(matches!(
                table.resolve("", &path, None),
                RouteOutcome::Matched(m) if m.view == View::FacetValues(facet)
            ));
        }
    }

    #[test]
    fn test_every_route_redirects_to_canonical_slash() {
        let table = RouteTable::standard().unwrap();
        for route in table.routes() {
            let segments: Vec<&str> = route
                .pattern
                .iter()
                .map(|segment| match segment {
                    Segment::Literal(lit) => *lit,
                    Segment::Param => "v x/y",
                })
                .collect();
            let canonical = encode_path(&segments, route.shape);
            let wrong = match route.shape {
                Shape::Collection => canonical.trim_end_matches('/').to_string(),
                Shape::Item => format!("{}/", canonical),
            };

            assert_eq!(
                table.resolve("/mpd", &wrong, Some("format=json&s=a%20b")),
                RouteOutcome::Redirect(format!("/mpd{}?format=json&s=a+b", canonical)),
                "redirect for {:?}",
                route.view
            );
            assert!(
                matches!(
                    table.resolve("/mpd", &canonical, None),
                    RouteOutcome::Matched(m) if m.view == route.view
                ),
                "match for {:?}",
                route.view
            );
        }
    }
}
