use geotrack::algorithms::segmentation::{find_stops, split_return_trip, ReturnTripMode, StopMode, SIDE_EFFECT};

mod common;
use common::{stop_then_move, u_turn};

#[test]
fn global_stop_detection() {
    let track = stop_then_move();
    let stops = find_stops(&track, StopMode::Global { diameter: 20.0, duration: 60.0 }).unwrap();
    assert_eq!(stops.len(), 1);
    assert_eq!((stops[0].id_ini, stops[0].id_end), (0, 29));
    assert_eq!(stops[0].nb_points(), 30);
    assert!(stops[0].radius <= 10.0);
    assert!(stops[0].duration >= 60.0);
}

#[test]
fn local_stop_detection() {
    let track = stop_then_move();
    let stops = find_stops(&track, StopMode::Local { speed: 1.5, duration: 60.0 }).unwrap();
    assert_eq!(stops.len(), 1);
    assert_eq!(stops[0].id_ini, 0);
    assert!(stops[0].id_end >= 28 && stops[0].id_end <= 30);
}

#[test]
fn return_trip_pivot_near_apex() {
    let track = u_turn();
    for mode in [ReturnTripMode::Exhaustive, ReturnTripMode::Fast] {
        let trip = split_return_trip(&track, mode, SIDE_EFFECT).unwrap();
        assert_eq!(trip.legs.len(), 2);
        assert!(trip.pivot.abs_diff(50) <= 5, "{mode:?} pivot {}", trip.pivot);
        assert_eq!(trip.legs[0].size() + trip.legs[1].size(), track.size() + 1);
    }
}
